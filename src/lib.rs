pub mod application;
pub mod cli;
pub mod connector;
pub mod domain;

pub use application::{
    ChatSession, ChatTransport, CompletionService, ConnectionMonitor, RelayChatUseCase,
    RetryController, SessionConfig, TurnOutcome, TurnRenderer, TurnResponse,
};

pub use cli::Commands;

pub use connector::{
    build_router, serve, ApiError, ConsoleRenderer, Container, ContainerConfig,
    MockCompletionService, OpenAiCompletionClient, RecordingRenderer, RelayHttpClient,
};

pub use domain::{
    ChatMessage, ConnectionStatus, ConversationHistory, DomainError, Frame, FrameParser, Role,
    ServerInfo, StatusReport, Turn, TurnState,
};

//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（SessionStore、CueStore、CompletionClient、SpeechSynthesizer 等）
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;

// Re-exports
pub use commands::{
    // Credential commands
    ClearCredentialCommand,
    ClearCredentialResponse,
    SetCredentialCommand,
    SetCredentialResponse,
    // Session commands
    CloseSessionCommand,
    CloseSessionResponse,
    OpenSessionCommand,
    OpenSessionResponse,
    SetColorSchemeCommand,
    SetColorSchemeResponse,
    SetMuteCommand,
    SetMuteResponse,
    SetPlayerModeCommand,
    SetPlayerModeResponse,
    // Turn commands
    CancelTurnCommand,
    CancelTurnResponse,
    SubmitOutcome,
    SubmitTurnCommand,
    SubmitTurnResponse,
    // Handlers
    handlers::{
        CancelTurnHandler, ClearCredentialHandler, CloseSessionHandler, OpenSessionHandler,
        SetColorSchemeHandler, SetCredentialHandler, SetMuteHandler, SetPlayerModeHandler,
        SubmitTurnHandler,
    },
};

pub use error::ApplicationError;

pub use ports::{
    // Audio output
    AudioOutputPort,
    PlaybackEnd,
    PlaybackError,
    // Completion client
    ChatMessage,
    ChatRole,
    CompletionClientPort,
    CompletionError,
    CompletionRequest,
    CompletionStream,
    // Credentials
    ApiCredential,
    CredentialError,
    CredentialStorePort,
    // Cue store
    AudioCue,
    CueError,
    CueState,
    CueStorePort,
    // Session store
    BusyPolicy,
    CancelOutcome,
    DeltaApplied,
    ExchangeTicket,
    FinishOutcome,
    PlayerModeChange,
    RequestHandle,
    Session,
    SessionError,
    SessionStorePort,
    SubmitDecision,
    // Speech synthesizer
    SpeechSynthesizerPort,
    SynthesisError,
    SynthesisRequest,
    SynthesizedAudio,
    VoiceParams,
};

pub use queries::{
    // Session queries
    GetNarrationStatusQuery,
    GetSessionQuery,
    ListSessionsQuery,
    // Handlers
    handlers::{
        CueView, GetNarrationStatusHandler, GetSessionHandler, ListSessionsHandler,
        NarrationStatusResponse, SegmentView, SessionSummary, SessionView, TurnView,
    },
};

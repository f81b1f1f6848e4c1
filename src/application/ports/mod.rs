//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod audio_output;
mod completion;
mod credentials;
mod cue_store;
mod session_store;
mod speech;

pub use audio_output::{AudioOutputPort, PlaybackEnd, PlaybackError};
pub use completion::{
    ChatMessage, ChatRole, CompletionClientPort, CompletionError, CompletionRequest,
    CompletionStream,
};
pub use credentials::{ApiCredential, CredentialError, CredentialStorePort};
pub use cue_store::{AudioCue, CueError, CueState, CueStorePort};
pub use session_store::{
    BusyPolicy, CancelOutcome, DeltaApplied, ExchangeTicket, FinishOutcome, PlayerModeChange,
    RequestHandle, Session, SessionError, SessionStorePort, SubmitDecision,
};
pub use speech::{
    SpeechSynthesizerPort, SynthesisError, SynthesisRequest, SynthesizedAudio, VoiceParams,
};

pub mod dispatcher;
pub mod llm;
pub mod pipeline;
pub mod sentence;
pub mod session;
pub mod sink;
pub mod stt;
pub mod tts;

// Re-export commonly used types for convenience
pub use dispatcher::{DispatchOutcome, SynthesisDispatcher, SynthesisOutcome, synthesis_slots};

pub use llm::{
    ChatMessage, ChatRole, LLMConfig, LLMError, LLMResult, OpenAIChatStream, TokenSource,
    TokenStream, create_token_source,
};

pub use pipeline::{TurnOutcome, TurnPipeline, TurnResources, TurnState, TurnStatus};

pub use sentence::{Sentence, SentenceDetector, SentencePolicy};

pub use session::{
    ConversationHistory, Session, SessionConfig, SessionError, SessionHandle, SessionRegistry,
    SessionResult, spawn_idle_sweeper,
};

pub use sink::{ChannelSink, SinkEvent, TurnEventSink};

pub use stt::{
    DeepgramSTT, STTConfig, STTError, STTResult, TranscriptEvent, TranscriptionSource,
    UtteranceAssembler, create_transcription_source,
};

pub use tts::{
    AudioData, OpenAITTS, SynthesisClient, TTSConfig, TTSError, TTSResult,
    create_synthesis_client, get_tts_provider_urls,
};

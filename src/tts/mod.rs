//! Модуль для работы с TTS
//!
//! Этот модуль содержит загрузку синтезированной речи через набор
//! конечных точек, кэширование фрагментов и планирование синтеза субтитров.

pub mod cache;
pub mod chunker;
pub mod endpoint;
pub mod fetch;
pub mod router;
pub mod scheduler;
pub mod synthesizer;

pub use cache::{ChunkCache, FileChunkCache, MemoryChunkCache, NoopChunkCache};
pub use fetch::{AudioTransport, Connectivity, FetchClient, FetchSettings, ReqwestTransport};
pub use router::{EndpointRouter, EndpointStats};
pub use scheduler::{RunReport, SynthesisScheduler};
pub use synthesizer::{CueSynthesizer, SynthesizedCue};

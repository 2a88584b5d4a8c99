//! Работа со звуком: PCM, декодирование, ресемплинг, сборка и сведение

pub mod decode;
pub mod encode;
pub mod mixer;
pub mod pcm;
pub mod sources;
pub mod stretch;
pub mod timeline;

pub use mixer::{apply_fade, mix, render_mix, Remixer};
pub use pcm::Pcm;
pub use timeline::assemble;

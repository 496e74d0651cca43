pub mod models;
pub mod oneshot;
pub mod sink;
pub mod tailer;
pub mod watermark;

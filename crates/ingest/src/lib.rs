pub mod otlp;
pub mod pipeline;

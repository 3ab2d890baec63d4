mod consumer_ctx;

pub use consumer_ctx::ConsumerCtx;

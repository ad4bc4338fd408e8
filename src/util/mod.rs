pub mod clock;
pub(crate) mod retry;
pub(crate) mod runnable;

//! C5 stream operators: pure buffer-transform functions grounded
//! file-by-file on the original filters, plus thin `StageHooks`
//! wiring so each transform becomes a runnable binary. The transforms
//! are kept free of socket/state concerns so they can be unit tested
//! directly against encoded byte buffers.

pub mod chafi;
pub mod cofi;
pub mod compress;
pub mod fifo;
pub mod replay;
pub mod sofi;
pub mod waan;

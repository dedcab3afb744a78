//! §4.A analytics kernels — pure, deterministic functions of their inputs.
//!
//! Every function here is side-effect-free: same input, same output, bitwise,
//! modulo the rounding each formula documents. None of them touch the
//! cache/store adapter; the worker pool (§4.C) is the only caller, and it
//! owns all I/O around these calls.

mod atm;
mod iv_surface;
mod max_pain;
mod ohlc;
mod oi_buildup;
mod pcr;

pub use atm::{atm_straddle, atm_strike};
pub use iv_surface::assemble_iv_surface;
pub use max_pain::max_pain_strike;
pub use ohlc::update_ohlc_window;
pub use oi_buildup::{oi_buildup_otm, total_oi};
pub use pcr::{pcr_oi, pcr_volume, PcrResult};

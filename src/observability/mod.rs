//! Crash reports, per-thread context and log setup.
//!
//! Install the panic hook and the subscriber at startup:
//!
//! ```ignore
//! use coveron::observability::{init_logging, install_panic_hook};
//!
//! fn main() {
//!     install_panic_hook();
//!     init_logging(0);
//! }
//! ```
//!
//! Mark what a worker is doing so a crash report can name it:
//!
//! ```ignore
//! use coveron::observability::{set_current_file, set_phase, InstrumentPhase};
//!
//! let _file = set_current_file(&input);
//! let _phase = set_phase(InstrumentPhase::Parsing);
//! ```

pub mod context;
pub mod logging;
pub mod panic_hook;

pub use context::{
    get_current_context, get_progress, increment_processed, reset_context, set_current_file,
    set_phase, set_progress, ContextGuard, InstrumentContext,
    InstrumentPhase,
};
pub use logging::{init_logging, level_for_verbosity};
pub use panic_hook::install_panic_hook;

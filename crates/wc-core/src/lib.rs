// SPDX-License-Identifier: Apache-2.0
//! Working-copy engine facade. [`WcContext`] is the single entry point
//! wiring the metadata store, lock manager, pristine store, work-queue
//! executor, and configuration service behind one handle, and re-exports
//! the delta-editor and reporter contracts consumers drive updates and
//! commits through.
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(unsafe_code)]

mod context;
mod error;

pub use context::WcContext;
pub use error::{WcError, WcErrorCode};
pub use wc_editor::{DeltaEditor, DirToken, FileToken, NoopWindowHandler, Reporter, WindowHandler};

/// Result alias for facade operations.
pub type Result<T> = std::result::Result<T, WcError>;

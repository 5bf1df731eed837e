// SPDX-License-Identifier: Apache-2.0
//! Delta-editor and reporter contracts, plus the ambient-depth filtering
//! driver that sits between an update/switch drive and a consuming editor.
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(unsafe_code)]

mod depth_filter;
mod editor;
mod reporter;

pub use depth_filter::DepthFilterEditor;
pub use editor::{DeltaEditor, DirToken, FileToken, NoopWindowHandler, WindowHandler};
pub use reporter::Reporter;

use thiserror::Error;
use wc_db::DbError;

/// Errors raised while driving or filtering an editor.
#[derive(Debug, Error)]
pub enum EditorError {
    /// The underlying metadata store failed.
    #[error("wc-editor db error: {0}")]
    Db(#[from] DbError),
    /// A caller passed a directory or file token this editor never handed
    /// out (or one already closed).
    #[error("unknown editor baton")]
    UnknownBaton,
}

/// Result alias for editor operations.
pub type Result<T> = std::result::Result<T, EditorError>;

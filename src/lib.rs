//! LumenFE: the editing core of an AI photo editor.
//!
//! A non-destructive edit history over immutable image artifacts, local
//! compositing (crop, transforms, filters, blends, text) and remote
//! generative edits behind a cache, coordinated by [`app::EditorApp`].

#[macro_use]
pub mod i18n;
#[macro_use]
pub mod logger;

pub mod ai;
pub mod app;
pub mod artifact;
pub mod cache;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;

pub use app::{EditorApp, Notice, NoticeLevel, Outcome};
pub use artifact::Artifact;

//! Library crate for wgadm.
//!
//! This crate exposes the building blocks of the console:
//! - Admin API records, the `AdminApi` trait and an in-memory backend (`api`)
//! - Application state, dialogs and the update loop (`app`)
//! - Form sessions, validation and field rules (`form`)
//! - The typed modal registry and modal lifecycles (`modal`)
//! - Searchable multi-select lists (`selection`)
//! - UI rendering and widgets (`ui`)
//!
//! It is used by the `wgadm` binary and by tests.
#![doc = include_str!("../README.md")]
#![deny(rustdoc::broken_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod api;
pub mod app;
pub mod error;
pub mod form;
pub mod modal;
pub mod search;
pub mod selection;
pub mod ui;

/// Convenient error and result types shared across the crate.
pub use error::{DynError, Result};

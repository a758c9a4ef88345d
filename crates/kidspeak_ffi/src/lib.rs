//! Flutter-facing bridge over `kidspeak_core`.

pub mod api;

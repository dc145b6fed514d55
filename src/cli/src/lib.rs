//! Nydus load CLI - loads nydus images and merges their bootstraps.

pub mod commands;

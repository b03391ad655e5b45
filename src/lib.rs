/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A write-buffering storage engine.
//!
//! Many threads submit reads and writes against one logical datastore. The engine:
//! - Runs every read and write on a single [serialized execution context](executor), so that the
//!   user's [primary persistence context](pluggables::PrimaryContext) only ever has one writer.
//! - Buffers writes and [commits](storage) them in batches, at moments picked by the
//!   [scheduler]: when a burst of requests has ended, or when the number of uncommitted objects
//!   reaches a threshold.
//! - After each commit, merges the committed changes into a
//!   [secondary context](pluggables::SecondaryContext) on a foreground thread, and then
//!   [notifies](bus) interested parties on the execution contexts they chose.
//!
//! Start with [`storage::StorageSpec`].

pub mod bus;

pub mod config;

pub mod errors;

pub(crate) mod event_bus;

pub mod events;

pub mod executor;

pub(crate) mod hooks;

pub mod logging;

pub(crate) mod pending;

pub(crate) mod pipeline;

pub mod pluggables;

pub mod scheduler;

pub mod storage;

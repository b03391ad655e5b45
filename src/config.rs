/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Parameters of a [storage](crate::storage::Storage).
//!
//! The configuration can be defined using the builder pattern, for example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .save_threshold(1000)
//!     .storage_label("roster-storage")
//!     .log_events(true)
//!     .build()
//! ```

use typed_builder::TypedBuilder;

use crate::scheduler::DEFAULT_SAVE_THRESHOLD;

/// Stores the user-defined parameters of a storage, that is:
/// 1. The initial save threshold, which bounds how many dirty objects may pile up while work units are
///    still pending. It can be changed later with
///    [`Storage::set_save_threshold`](crate::storage::Storage::set_save_threshold).
/// 2. The label of the storage's execution context, used as the name of its worker thread and in
///    error messages.
/// 3. The "Log Events" flag, if set to "true" then [events](crate::events) are logged.
///
/// ## Log Events
///
/// The storage logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, Debug, TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Optional:
    - `.save_threshold(...)`
    - `.storage_label(...)`
    - `.log_events(...)`
"))]
pub struct Configuration {
    #[builder(
        default = DEFAULT_SAVE_THRESHOLD,
        setter(doc = "Set the maximum number of dirty objects tolerated before a commit is forced. Optional, defaults to 500.")
    )]
    pub save_threshold: usize,
    #[builder(
        default = String::from("storage"),
        setter(into, doc = "Set the label of the storage's execution context. Optional, defaults to \"storage\".")
    )]
    pub storage_label: String,
    #[builder(
        default = false,
        setter(doc = "Enable logging of events? Optional, defaults to false.")
    )]
    pub log_events: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration::builder().build()
    }
}

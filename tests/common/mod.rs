#![allow(dead_code)]

pub(crate) mod logging;

pub(crate) mod mem_store;

pub(crate) mod wait;

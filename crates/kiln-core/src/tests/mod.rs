//! Behavioural suites exercising the manager and operation scheduling.

pub(crate) mod support;

//! Tests that need more than one module (and the mocks to fake them)

pub mod mock;

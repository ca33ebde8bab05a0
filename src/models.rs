pub mod credits;
pub mod messaging;
pub mod tenancy;
pub mod webhook;

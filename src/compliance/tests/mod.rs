mod common;

mod audits;
mod engine;
mod issues;

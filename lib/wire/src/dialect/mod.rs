//! One codec per socket dialect. Each owns a disjoint opcode space; the
//! opcode is the first payload byte after the frame header.

pub mod admin;
pub mod agent;
pub mod client;
pub mod monitor;

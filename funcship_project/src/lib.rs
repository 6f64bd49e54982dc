// SPDX-License-Identifier: MIT

pub mod artifact;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod project;
pub mod retry;
pub mod unit;

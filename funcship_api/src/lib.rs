// SPDX-License-Identifier: MIT

#[cfg(feature = "aws_impl")]
pub mod aws_impl;

pub mod error;
pub mod function;
pub mod invocation;
pub mod registry;
pub mod util;

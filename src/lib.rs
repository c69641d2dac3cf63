// SPDX-License-Identifier: GPL-3.0-or-later

pub mod attribution;
pub mod config;
pub mod git_core;
pub mod github;
pub mod report;
pub mod utils;

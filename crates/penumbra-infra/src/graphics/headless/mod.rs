// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A recording, validating device with no GPU behind it.
//!
//! Used by tests, benchmarks and headless runs of the renderer.

mod command;
mod device;
mod validation;

pub use self::command::RecordedCommand;
pub use self::device::{
    HeadlessDevice, Submission, BACK_BUFFER_COUNT, DEFAULT_MAX_TEXTURE_DIMENSION,
};
pub use self::validation::{ResourceRef, StateViolation};

// Copyright 2022 Ryan Seipp
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

//! Incremental HTTP/1.1 response parsing.
//!
//! Outgoing request bytes are the script's responsibility (see
//! [`crate::script`]); this module only scans what comes back off the wire.

pub mod response;
pub mod version;

pub use response::{Completion, ParseError, ParseResult, ResponseParser};
pub use version::Version;

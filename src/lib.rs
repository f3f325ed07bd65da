// Copyright 2025 Zhipu AI (Original Python implementation)
// Copyright 2025 ModerRAS (Rust implementation)
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

//! # ADB Agent
//!
//! LLM-driven agent that operates Android devices over ADB.
//!
//! Each step captures a screenshot and the foreground app, sends them with
//! the conversation so far to an OpenAI-compatible vision model, parses the
//! single action it picks (tap, swipe, type, launch, ...), runs it on the
//! device and records the outcome. The loop ends when the model finishes the
//! task or the step budget is used up.
//!
//! The model can answer either in the `do(action="...")` / `finish(message="...")`
//! text protocol or with function calls; see [`ParserMode`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use adb_agent::{AgentConfig, ModelConfig, ParserMode, PhoneAgent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let model_config = ModelConfig::default().with_stream(true);
//!     let agent_config = AgentConfig::default()
//!         .with_lang("en")
//!         .with_mode(ParserMode::Tools);
//!
//!     let mut agent = PhoneAgent::new(model_config, agent_config, None, None);
//!     let result = agent.run("Open Settings and turn on Wi-Fi").await?;
//!
//!     println!("Task result: {}", result);
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod adb;
pub mod agent;
pub mod config;
pub mod device;
pub mod model;
pub mod preflight;
pub mod settings;

pub use actions::{Action, ActionHandler, ActionResult, DoAction, ParserMode};
pub use adb::{ADBConnection, AdbDevice};
pub use agent::{AgentConfig, AgentError, AgentState, PhoneAgent, StepResult};
pub use device::{Device, DeviceError, Screenshot};
pub use model::{ChatModel, ModelClient, ModelConfig, ModelError, ModelResponse};
pub use settings::AppSettings;

//! # sedrun - SED task preprocessing and execution
//!
//! sedrun runs declaratively specified simulation experiments against a
//! stateful simulation engine. It translates symbolic references (model
//! component addresses, KiSAO algorithm ids, output variables) into engine
//! handles once, then runs and re-runs the experiment cheaply.
//!
//! ## Core Concepts
//!
//! - **Task**: a simple task (one model under one simulation) or a repeated
//!   task that sweeps model values over sub-tasks
//! - **Substitution policy**: how far a requested algorithm may be replaced by
//!   a supported one
//! - **PreprocessedTask**: engines loaded, algorithms and targets resolved,
//!   reusable across runs
//! - **TaskLog**: what ran, with which solver settings, and what went wrong
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sedrun::{Config, Simulator, Task, Variable};
//! use sedrun::engine::memory::MemoryEngineFactory;
//!
//! let engines = Arc::new(MemoryEngineFactory::new());
//! let simulator = Simulator::new(Config::from_env()?, engines.clone(), engines)?;
//!
//! let task = Task::from_json(&std::fs::read_to_string("task.json")?)?;
//! let variables = vec![Variable::time("time")];
//! let prepared = simulator.preprocess(&task, &variables)?;
//! let (results, log) = simulator.exec_task(&task, &variables, Some(&prepared))?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Inputs and collaborators
pub mod algorithm;
pub mod config;
pub mod engine;
pub mod error;
pub mod target;
pub mod task;
pub mod value;

// Preprocessing and execution
pub mod execute;
pub mod preprocess;
pub mod results;
pub mod runtime;
pub mod simulator;

pub use algorithm::{
    AlgorithmCatalog, AlgorithmCatalogEntry, AlgorithmSpec, ParameterChange, ParameterSpec, SolverRole, SolverSettings,
    SubstitutionPolicy,
};
pub use config::Config;
pub use engine::{ComponentKind, Engine, EngineError, EngineFactory, ModelDescription, ModelReader};
pub use error::{AlgorithmError, ExecutionError, SedError, SedResult, TargetRole, ValidationError};
pub use execute::TaskExecutor;
pub use preprocess::{LeafContext, PreprocessedTask, RunState, TaskPreprocessor};
pub use results::{
    Diagnostic, DiagnosticKind, RunId, SimulatorDetails, TaskLog, TaskStatus, VariableResult, VariableResults,
};
pub use runtime::{ExecutionHandle, ExecutionJob, TaskRuntime, TaskRuntimeConfig};
pub use simulator::Simulator;
pub use target::TargetKey;
pub use task::{
    Model, ModelChange, RepeatedTask, SetValue, SimpleTask, Simulation, SteadyState, SubTask, Task, TaskFingerprint,
    UniformTimeCourse, Variable, TIME_SYMBOL,
};
pub use value::{ChangeValue, ParameterValue, ValueType};

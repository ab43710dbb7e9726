//! One-call entry point pairing a preprocessor with an executor.

use std::sync::Arc;

use crate::algorithm::AlgorithmCatalog;
use crate::config::Config;
use crate::engine::{EngineFactory, ModelReader};
use crate::error::SedResult;
use crate::execute::TaskExecutor;
use crate::preprocess::{PreprocessedTask, TaskPreprocessor};
use crate::results::{TaskLog, VariableResults};
use crate::task::{Task, Variable};

/// Preprocesses and executes tasks with one shared configuration.
#[derive(Debug, Clone)]
pub struct Simulator {
    preprocessor: TaskPreprocessor,
    executor: TaskExecutor,
}

impl Simulator {
    pub fn new(config: Config, engines: Arc<dyn EngineFactory>, reader: Arc<dyn ModelReader>) -> SedResult<Self> {
        let executor = TaskExecutor::new(config.clone())?;
        let preprocessor = TaskPreprocessor::new(config, engines, reader)?;
        Ok(Self { preprocessor, executor })
    }

    /// Creates a simulator configured from the process environment.
    pub fn from_env(engines: Arc<dyn EngineFactory>, reader: Arc<dyn ModelReader>) -> SedResult<Self> {
        Self::new(Config::from_env()?, engines, reader)
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: AlgorithmCatalog) -> Self {
        self.preprocessor = self.preprocessor.with_catalog(catalog);
        self
    }

    #[must_use]
    pub const fn preprocessor(&self) -> &TaskPreprocessor {
        &self.preprocessor
    }

    #[must_use]
    pub const fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub fn preprocess(&self, task: &Task, variables: &[Variable]) -> SedResult<PreprocessedTask> {
        self.preprocessor.preprocess(task, variables)
    }

    /// Executes `task`, preprocessing it first unless `preprocessed` is given.
    ///
    /// Pass the result of [`Simulator::preprocess`] to amortize model loading
    /// across runs that differ only in change values.
    pub fn exec_task(
        &self,
        task: &Task,
        variables: &[Variable],
        preprocessed: Option<&PreprocessedTask>,
    ) -> SedResult<(VariableResults, TaskLog)> {
        match preprocessed {
            Some(preprocessed) => self.executor.execute(task, preprocessed, variables),
            None => {
                let preprocessed = self.preprocess(task, variables)?;
                self.executor.execute(task, &preprocessed, variables)
            }
        }
    }
}

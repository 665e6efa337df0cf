//! The phase state machine driving a whole run.
//!
//! Phases execute strictly sequentially; each one loops tool invocations
//! under its own iteration budget and decides from the returned signal
//! whether to continue, finish, or abort. Every tool call goes through an
//! [`Executor`] trait object, so tests drive the machine with scripted
//! results instead of child processes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Mode, RunnerConfig};
use crate::errors::{ExecError, RunnerError};
use crate::executor::{AgentExecutor, Executor, ReviewerExecutor, ScriptExecutor};
use crate::input::{DraftDecision, InputCollector};
use crate::logger::RunLogger;
use crate::phase::Phase;
use crate::plan;
use crate::signals::{self, Signal};

pub struct Runner {
    config: RunnerConfig,
    logger: Arc<RunLogger>,
    input: Arc<dyn InputCollector>,
    agent: Arc<dyn Executor>,
    reviewer: Arc<dyn Executor>,
    cancel: CancellationToken,
}

fn review_budget(max_iterations: u32) -> u32 {
    (max_iterations / 10).max(3)
}

fn external_review_budget(max_iterations: u32) -> u32 {
    (max_iterations / 5).max(3)
}

fn plan_budget(max_iterations: u32) -> u32 {
    (max_iterations / 5).max(5)
}

impl Runner {
    pub fn new(
        config: RunnerConfig,
        logger: Arc<RunLogger>,
        input: Arc<dyn InputCollector>,
        cancel: CancellationToken,
    ) -> Self {
        // A configured script stands in for the agent CLI
        let agent: Arc<dyn Executor> = if config.agent.script.is_some() {
            Arc::new(ScriptExecutor::new(config.agent.clone(), Arc::clone(&logger)))
        } else {
            Arc::new(AgentExecutor::new(config.agent.clone(), Arc::clone(&logger)))
        };
        let reviewer: Arc<dyn Executor> = Arc::new(ReviewerExecutor::new(
            config.reviewer.clone(),
            Arc::clone(&logger),
        ));

        Self {
            config,
            logger,
            input,
            agent,
            reviewer,
            cancel,
        }
    }

    #[cfg(test)]
    fn with_executors(mut self, agent: Arc<dyn Executor>, reviewer: Arc<dyn Executor>) -> Self {
        self.agent = agent;
        self.reviewer = reviewer;
        self
    }

    /// Run the phase sequence selected by the configured mode.
    pub async fn run(&self) -> Result<(), RunnerError> {
        info!(
            mode = %self.config.mode,
            max_iterations = self.config.max_iterations,
            "starting run"
        );

        match self.config.mode {
            Mode::Full => {
                self.run_task_phase().await?;
                self.run_review_phase(true).await?;
                self.run_external_review_phase().await?;
                self.run_review_phase(false).await?;
                self.run_finalize_phase().await
            }
            Mode::ReviewOnly => {
                self.run_review_phase(true).await?;
                self.run_external_review_phase().await?;
                self.run_review_phase(false).await?;
                self.run_finalize_phase().await
            }
            Mode::ExternalReviewOnly => {
                self.run_external_review_phase().await?;
                self.run_review_phase(false).await?;
                self.run_finalize_phase().await
            }
            Mode::TasksOnly => self.run_task_phase().await,
            Mode::Plan => self.run_plan_phase().await,
        }
    }

    /// Work through the plan until nothing unchecked remains.
    ///
    /// The prompt is identical every iteration; the tool re-reads the plan
    /// file itself, so state lives on disk rather than in the prompt. A
    /// completion claim only ends the phase once an independent scan of the
    /// plan finds zero unchecked items.
    async fn run_task_phase(&self) -> Result<(), RunnerError> {
        let phase = Phase::Task;
        let budget = self.config.max_iterations;
        let mut failures: u32 = 0;

        self.logger.info(
            phase,
            &format!("working plan {}", self.config.plan_file.display()),
        );

        for iteration in 1..=budget {
            self.check_cancelled()?;
            self.logger.start_iteration(phase, iteration, budget);

            let result = self.agent.run(&self.cancel, &self.config.prompts.task).await;
            self.classify(phase, result.error)?;

            match result.signal {
                Some(Signal::TasksCompleted) => match plan::count_unchecked(&self.config.plan_file)
                {
                    Ok(0) => {
                        self.logger.info(phase, "all tasks complete");
                        return Ok(());
                    }
                    Ok(remaining) => {
                        self.logger.warn(
                            phase,
                            &format!(
                                "completion claimed but {remaining} unchecked item(s) remain; continuing"
                            ),
                        );
                    }
                    Err(e) => {
                        self.logger
                            .warn(phase, &format!("could not verify plan file: {e:#}"));
                    }
                },
                Some(Signal::TaskFailed) => {
                    failures += 1;
                    if failures > self.config.task_retries {
                        self.logger
                            .error(phase, &format!("task failed after {failures} attempt(s)"));
                        return Err(RunnerError::TaskFailed { attempts: failures });
                    }
                    self.logger.warn(
                        phase,
                        &format!(
                            "task failed ({failures} of {} allowed); retrying",
                            self.config.task_retries + 1
                        ),
                    );
                }
                _ => {}
            }

            // No point delaying the exhaustion report after the last slot
            if iteration < budget {
                self.pause_between_iterations().await?;
            }
        }

        Err(RunnerError::BudgetExhausted {
            phase,
            iterations: budget,
        })
    }

    /// Review pass: optionally one full review up front, then a bounded
    /// continuation loop. Exhausting the loop is not fatal; the phase warns
    /// and lets the run proceed.
    async fn run_review_phase(&self, initial: bool) -> Result<(), RunnerError> {
        let phase = Phase::Review;
        let budget = review_budget(self.config.max_iterations);

        if initial {
            self.check_cancelled()?;
            self.logger.info(phase, "running full review");
            let result = self
                .agent
                .run(&self.cancel, &self.config.prompts.review)
                .await;
            self.classify(phase, result.error)?;
            if matches!(result.signal, Some(Signal::ReviewDone)) {
                self.logger.info(phase, "review finished clean on the first pass");
                return Ok(());
            }
        }

        for iteration in 1..=budget {
            self.check_cancelled()?;
            self.logger.start_iteration(phase, iteration, budget);

            let result = self
                .agent
                .run(&self.cancel, &self.config.prompts.review_continue)
                .await;
            self.classify(phase, result.error)?;

            if matches!(result.signal, Some(Signal::ReviewDone)) {
                self.logger.info(phase, "review complete");
                return Ok(());
            }
        }

        self.logger.warn(
            phase,
            &format!("review loop spent {budget} iteration(s) without finishing; proceeding"),
        );
        Ok(())
    }

    /// Alternate reviewer findings with agent evaluations, carrying each
    /// evaluation into the next reviewer call as context.
    async fn run_external_review_phase(&self) -> Result<(), RunnerError> {
        let phase = Phase::ExternalReview;
        let budget = external_review_budget(self.config.max_iterations);
        let mut carry: Option<String> = None;

        for iteration in 1..=budget {
            self.check_cancelled()?;
            self.logger.start_iteration(phase, iteration, budget);

            let prompt = match &carry {
                Some(context) => format!(
                    "{}\n\n## Prior evaluation\n\n{}",
                    self.config.prompts.external_review, context
                ),
                None => self.config.prompts.external_review.clone(),
            };
            let review = self.reviewer.run(&self.cancel, &prompt).await;
            self.classify(phase, review.error)?;

            if review.output.trim().is_empty() {
                self.logger
                    .info(phase, "reviewer returned no findings; skipping evaluation");
                return Ok(());
            }
            if matches!(review.signal, Some(Signal::ExternalReviewDone)) {
                self.logger.info(phase, "external review complete");
                return Ok(());
            }

            let eval_phase = Phase::Evaluation;
            self.logger.info(eval_phase, "evaluating reviewer findings");
            let eval_prompt = format!(
                "{}\n\n## Reviewer findings\n\n{}",
                self.config.prompts.evaluate, review.output
            );
            let evaluation = self.agent.run(&self.cancel, &eval_prompt).await;
            self.classify(eval_phase, evaluation.error)?;

            if matches!(evaluation.signal, Some(Signal::ExternalReviewDone)) {
                self.logger.info(phase, "external review complete");
                return Ok(());
            }

            // The agent's response travels into the next reviewer round
            carry = Some(evaluation.output);
        }

        self.logger.warn(
            phase,
            &format!("external review spent {budget} round(s) without converging; proceeding"),
        );
        Ok(())
    }

    /// Interactive plan drafting. Questions and draft reviews suspend the
    /// loop for human input; the outcome is appended to a session context
    /// block so later iterations see the whole conversation.
    async fn run_plan_phase(&self) -> Result<(), RunnerError> {
        let phase = Phase::Plan;
        let budget = plan_budget(self.config.max_iterations);
        let mut context = String::new();

        self.logger.info(
            phase,
            &format!("drafting plan at {}", self.config.plan_file.display()),
        );

        for iteration in 1..=budget {
            self.check_cancelled()?;
            self.logger.start_iteration(phase, iteration, budget);

            let prompt = if context.is_empty() {
                self.config.prompts.plan.clone()
            } else {
                format!(
                    "{}\n\n## Session notes\n\n{}",
                    self.config.prompts.plan, context
                )
            };
            let result = self.agent.run(&self.cancel, &prompt).await;
            self.classify(phase, result.error)?;

            match result.signal {
                Some(Signal::PlanReady) => {
                    self.logger.info(phase, "plan ready");
                    return Ok(());
                }
                Some(Signal::QuestionPending) => {
                    match signals::parse_question_payload(&result.output) {
                        Ok(payload) => {
                            let answer = self.input.ask_question(&payload)?;
                            self.logger.info(phase, &format!("answer recorded: {answer}"));
                            context.push_str(&format!("Q: {}\nA: {answer}\n", payload.question));
                        }
                        Err(e) => {
                            self.logger
                                .warn(phase, &format!("unusable question payload: {e}"));
                        }
                    }
                }
                Some(Signal::PlanDraftReady) => {
                    match signals::parse_plan_draft_payload(&result.output) {
                        Ok(draft) => match self.input.ask_draft_review(&draft)? {
                            DraftDecision::Accept => {
                                self.logger.info(phase, "draft accepted");
                                context
                                    .push_str("The draft was accepted; finish the plan file.\n");
                            }
                            DraftDecision::Revise(feedback) => {
                                self.logger.info(phase, "revision requested");
                                context.push_str(&format!(
                                    "Revision feedback on the draft: {feedback}\n"
                                ));
                            }
                            DraftDecision::Reject => {
                                self.logger.error(phase, "draft rejected");
                                return Err(RunnerError::DraftRejected);
                            }
                        },
                        Err(e) => {
                            self.logger
                                .warn(phase, &format!("unusable draft payload: {e}"));
                        }
                    }
                }
                _ => {}
            }
        }

        Err(RunnerError::BudgetExhausted {
            phase,
            iterations: budget,
        })
    }

    /// Best-effort wrap-up. Only cancellation escapes this phase.
    async fn run_finalize_phase(&self) -> Result<(), RunnerError> {
        let phase = Phase::Finalize;
        if !self.config.finalize {
            self.logger.info(phase, "finalize disabled; skipping");
            return Ok(());
        }
        self.check_cancelled()?;
        self.logger.info(phase, "running finalize step");

        let result = self
            .agent
            .run(&self.cancel, &self.config.prompts.finalize)
            .await;
        match result.error {
            Some(ExecError::Canceled) => return Err(RunnerError::Canceled),
            Some(e) => {
                self.logger
                    .warn(phase, &format!("finalize failed: {e}; continuing"));
            }
            None => {
                if matches!(result.signal, Some(Signal::TaskFailed)) {
                    self.logger.warn(phase, "finalize reported failure; continuing");
                } else {
                    self.logger.info(phase, "finalize complete");
                }
            }
        }
        Ok(())
    }

    /// Map a tool error onto the run's fate. Any error ends the phase;
    /// cancellation keeps its own identity all the way up.
    fn classify(&self, phase: Phase, error: Option<ExecError>) -> Result<(), RunnerError> {
        match error {
            None => Ok(()),
            Some(ExecError::Canceled) => {
                self.logger.warn(phase, "run canceled");
                Err(RunnerError::Canceled)
            }
            Some(ExecError::PatternMatch { pattern, help_cmd }) => {
                self.logger.error(
                    phase,
                    &format!("known failure pattern \"{pattern}\"; try: {help_cmd}"),
                );
                Err(RunnerError::Exec(ExecError::PatternMatch { pattern, help_cmd }))
            }
            Some(e) => {
                self.logger.error(phase, &e.to_string());
                Err(RunnerError::Exec(e))
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), RunnerError> {
        if self.cancel.is_cancelled() {
            return Err(RunnerError::Canceled);
        }
        Ok(())
    }

    /// Cancellation-aware inter-iteration delay.
    async fn pause_between_iterations(&self) -> Result<(), RunnerError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(RunnerError::Canceled),
            _ = tokio::time::sleep(self.config.iteration_delay) => Ok(()),
        }
    }
}

// src/goal/variants.rs

//! Concrete goal shapes.
//!
//! | Variant          | Dependencies  | Computation                              |
//! |------------------|---------------|------------------------------------------|
//! | [`StaticGoal`]   | none          | returns a pre-known value                |
//! | [`PipeGoal`]     | one upstream  | applies a function to the upstream value |
//! | [`GroupGoal`]    | N goals       | waits for all, yields `()`               |
//! | [`GeneratorGoal`]| none          | runs an async producer                   |

use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::errors::GoalError;
use crate::goal::{
    DependencyRef, Goal, GoalBuilder, GoalContext, GoalLogic, GoalValue, Outcome,
};

/// Goal with a value known up front.
pub struct StaticGoal<T> {
    value: T,
}

impl<T: GoalValue> StaticGoal<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: GoalValue> GoalLogic<T> for StaticGoal<T> {
    fn compute(&self, _ctx: GoalContext) -> BoxFuture<'static, Outcome<T>> {
        future::ready(Ok(self.value.clone())).boxed()
    }
}

type Transform<S, R> = Arc<dyn Fn(S) -> anyhow::Result<R> + Send + Sync>;

/// Goal transforming the value of exactly one upstream goal.
///
/// The transform only runs after the upstream succeeded; an upstream failure
/// is passed through unchanged.
pub struct PipeGoal<S, R> {
    upstream: Goal<S>,
    transform: Transform<S, R>,
}

impl<S: GoalValue, R: GoalValue> PipeGoal<S, R> {
    pub fn new(upstream: Goal<S>, transform: impl Fn(S) -> anyhow::Result<R> + Send + Sync + 'static) -> Self {
        Self {
            upstream,
            transform: Arc::new(transform),
        }
    }
}

impl<S: GoalValue, R: GoalValue> GoalLogic<R> for PipeGoal<S, R> {
    fn dependencies(&self) -> Vec<DependencyRef> {
        vec![self.upstream.as_dependency()]
    }

    fn compute(&self, _ctx: GoalContext) -> BoxFuture<'static, Outcome<R>> {
        let upstream = self.upstream.result();
        let transform = Arc::clone(&self.transform);
        async move {
            let value = upstream.wait().await?;
            transform(value).map_err(GoalError::failed)
        }
        .boxed()
    }
}

/// Fan-in goal: resolves once every member resolved successfully.
pub struct GroupGoal {
    members: Vec<DependencyRef>,
}

impl GroupGoal {
    pub fn new(members: impl IntoIterator<Item = DependencyRef>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }
}

impl GoalLogic<()> for GroupGoal {
    fn dependencies(&self) -> Vec<DependencyRef> {
        self.members.clone()
    }

    fn compute(&self, _ctx: GoalContext) -> BoxFuture<'static, Outcome<()>> {
        future::ready(Ok(())).boxed()
    }
}

type Producer<T> = Arc<dyn Fn(GoalContext) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Dependency-free goal running an async producer.
pub struct GeneratorGoal<T> {
    producer: Producer<T>,
}

impl<T: GoalValue> GeneratorGoal<T> {
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn(GoalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            producer: Arc::new(move |ctx| producer(ctx).boxed()),
        }
    }
}

impl<T: GoalValue> GoalLogic<T> for GeneratorGoal<T> {
    fn compute(&self, ctx: GoalContext) -> BoxFuture<'static, Outcome<T>> {
        let run = (self.producer)(ctx);
        async move { run.await.map_err(GoalError::failed) }.boxed()
    }
}

impl<T: GoalValue> Goal<T> {
    /// Goal resolving to `value`.
    pub fn fixed(value: T) -> Self {
        Goal::from_logic(StaticGoal::new(value))
    }

    /// Goal resolving to the output of `producer`.
    pub fn generate<F, Fut>(producer: F) -> Self
    where
        F: Fn(GoalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Goal::from_logic(GeneratorGoal::new(producer))
    }

    /// Goal applying `f` to this goal's value.
    pub fn pipe<R: GoalValue>(&self, f: impl Fn(T) -> R + Send + Sync + 'static) -> Goal<R> {
        self.try_pipe(move |value| Ok(f(value)))
    }

    /// Like [`Goal::pipe`] with a fallible transform.
    pub fn try_pipe<R: GoalValue>(
        &self,
        f: impl Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
    ) -> Goal<R> {
        GoalBuilder::new(PipeGoal::new(self.clone(), f))
            .runtime_opt(self.runtime_handle())
            .build()
    }
}

impl Goal<()> {
    /// Goal resolving once all `members` resolved.
    pub fn group(members: impl IntoIterator<Item = DependencyRef>) -> Self {
        Goal::from_logic(GroupGoal::new(members))
    }
}

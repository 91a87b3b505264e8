//! Deferred values
//!
//! An [`Output`] is a value that is not concrete when the program is declared:
//! a stack reference output, the data of a Secret read from the cluster, the
//! status of a release. Outputs are composed with pure transformations
//! (`apply`, `try_apply`, `zip`, `concat`) and only forced by the engine once
//! the resources they come from have been realized.
//!
//! Each output carries two pieces of metadata:
//! - the set of resources it was derived from, which becomes dependency edges
//!   when the output is used as a resource input
//! - a secret flag, which propagates through every transformation until it is
//!   explicitly cleared with [`Output::unsecret`]

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::error::{CoreError, Result};
use crate::plan::ResourceId;

type SharedResult<T> = std::result::Result<Resolved<T>, Arc<CoreError>>;

/// A realized output value
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub secret: bool,
}

/// A deferred value, cheap to clone and shared between consumers
pub struct Output<T: Clone + Send + Sync + 'static> {
    future: Shared<BoxFuture<'static, SharedResult<T>>>,
    deps: BTreeSet<ResourceId>,
}

impl<T: Clone + Send + Sync + 'static> Clone for Output<T> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            deps: self.deps.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for Output<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Output<T> {
    /// An output whose value is already known
    pub fn known(value: T) -> Self {
        Self::ready(Resolved {
            value,
            secret: false,
        })
    }

    /// A known value that is secret-flagged
    pub fn secret(value: T) -> Self {
        Self::ready(Resolved {
            value,
            secret: true,
        })
    }

    fn ready(resolved: Resolved<T>) -> Self {
        Self {
            future: futures::future::ready(Ok(resolved)).boxed().shared(),
            deps: BTreeSet::new(),
        }
    }

    /// Wrap an arbitrary future; it runs at most once, on first demand
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self::from_resolved_future(async move {
            future.await.map(|value| Resolved {
                value,
                secret: false,
            })
        })
    }

    /// Like [`Output::from_future`], with the future deciding the secret flag
    pub fn from_resolved_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Resolved<T>>> + Send + 'static,
    {
        let future = async move { future.await.map_err(Arc::new) };
        Self {
            future: future.boxed().shared(),
            deps: BTreeSet::new(),
        }
    }

    /// An output owned by a resource, filled in by the engine through the
    /// returned [`Resolver`] once the resource has been realized
    pub fn pending(owner: ResourceId) -> (Self, Resolver<T>) {
        let (tx, rx) = oneshot::channel::<SharedResult<T>>();
        let resource = owner.to_string();
        let future = rx.map(move |received| match received {
            Ok(result) => result,
            Err(oneshot::Canceled) => Err(Arc::new(CoreError::Unresolved { resource })),
        });

        let mut deps = BTreeSet::new();
        deps.insert(owner);

        (
            Self {
                future: future.boxed().shared(),
                deps,
            },
            Resolver { tx },
        )
    }

    /// Resources this output was derived from
    pub fn dependencies(&self) -> &BTreeSet<ResourceId> {
        &self.deps
    }

    /// Add an explicit resource dependency to this output
    pub fn with_dependency(mut self, resource: ResourceId) -> Self {
        self.deps.insert(resource);
        self
    }

    /// Transform the value once it is available
    pub fn apply<U, F>(self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.try_apply(move |value| Ok(f(value)))
    }

    /// Transform the value with a fallible function; the error becomes the
    /// error of the derived output
    pub fn try_apply<U, F>(self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        let future = self.future.map(move |result: SharedResult<T>| -> SharedResult<U> {
            let resolved = result?;
            let value = f(resolved.value).map_err(Arc::new)?;
            Ok(Resolved {
                value,
                secret: resolved.secret,
            })
        });
        Output {
            future: future.boxed().shared(),
            deps: self.deps,
        }
    }

    /// Combine two outputs; the result is secret if either side is
    pub fn zip<U>(self, other: Output<U>) -> Output<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let mut deps = self.deps;
        deps.extend(other.deps);

        let (left, right) = (self.future, other.future);
        let future = async move {
            let (left, right) = futures::join!(left, right);
            let (left, right) = (left?, right?);
            Ok::<_, Arc<CoreError>>(Resolved {
                value: (left.value, right.value),
                secret: left.secret || right.secret,
            })
        };
        Output {
            future: future.boxed().shared(),
            deps,
        }
    }

    /// Collect many outputs into one
    pub fn all(outputs: Vec<Output<T>>) -> Output<Vec<T>> {
        let deps = outputs
            .iter()
            .flat_map(|o| o.deps.iter().cloned())
            .collect();
        let inner: Vec<_> = outputs.into_iter().map(|o| o.future).collect();
        let future = async move {
            let mut secret = false;
            let mut values = Vec::with_capacity(inner.len());
            for result in futures::future::join_all(inner).await {
                let resolved = result?;
                secret |= resolved.secret;
                values.push(resolved.value);
            }
            Ok::<_, Arc<CoreError>>(Resolved {
                value: values,
                secret,
            })
        };
        Output {
            future: future.boxed().shared(),
            deps,
        }
    }

    /// Mark the value as secret
    pub fn as_secret(self) -> Self {
        self.with_secret(true)
    }

    /// Clear the secret flag
    pub fn unsecret(self) -> Self {
        self.with_secret(false)
    }

    fn with_secret(self, secret: bool) -> Self {
        let future = self.future.map(move |result| {
            result.map(|resolved| Resolved {
                value: resolved.value,
                secret,
            })
        });
        Self {
            future: future.boxed().shared(),
            deps: self.deps,
        }
    }

    /// Force the output
    pub async fn resolve(self) -> Result<Resolved<T>> {
        self.future.await.map_err(CoreError::from)
    }

    /// Force the output and drop the secret flag
    pub async fn value(self) -> Result<T> {
        self.resolve().await.map(|resolved| resolved.value)
    }

    /// The value if it is already available, without waiting
    pub fn peek(&self) -> Option<Resolved<T>> {
        self.future.clone().now_or_never().and_then(|r| r.ok())
    }
}

impl Output<String> {
    /// Append a literal suffix to a string output
    pub fn concat(self, suffix: impl Into<String>) -> Output<String> {
        let suffix = suffix.into();
        self.apply(move |value| format!("{value}{suffix}"))
    }
}

impl<T: Clone + Send + Sync + 'static> From<T> for Output<T> {
    fn from(value: T) -> Self {
        Output::known(value)
    }
}

/// Write half of a pending output
pub struct Resolver<T: Clone + Send + Sync + 'static> {
    tx: oneshot::Sender<SharedResult<T>>,
}

impl<T: Clone + Send + Sync + 'static> Resolver<T> {
    /// Fulfil the output with a plain value
    pub fn resolve(self, value: T) {
        self.send(Ok(Resolved {
            value,
            secret: false,
        }));
    }

    /// Fulfil the output with a secret-flagged value
    pub fn resolve_secret(self, value: T) {
        self.send(Ok(Resolved {
            value,
            secret: true,
        }));
    }

    /// Fail the output
    pub fn fail(self, error: CoreError) {
        self.send(Err(Arc::new(error)));
    }

    fn send(self, result: SharedResult<T>) {
        // No receivers left means nothing consumes this output.
        let _ = self.tx.send(result);
    }
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ResourceType;

    fn release_id(name: &str) -> ResourceId {
        ResourceId::new(ResourceType::Release, name)
    }

    #[tokio::test]
    async fn test_known_value() {
        let out = Output::known(42u32);
        let resolved = out.resolve().await.unwrap();
        assert_eq!(resolved.value, 42);
        assert!(!resolved.secret);
    }

    #[tokio::test]
    async fn test_apply_chain() {
        let out = Output::known("prometheus".to_string())
            .apply(|s| s.len())
            .apply(|n| n * 2);
        assert_eq!(out.value().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_secret_propagates_through_apply() {
        let out = Output::secret("hunter2".to_string()).apply(|s| s.to_uppercase());
        let resolved = out.resolve().await.unwrap();
        assert_eq!(resolved.value, "HUNTER2");
        assert!(resolved.secret);
    }

    #[tokio::test]
    async fn test_unsecret_clears_flag() {
        let out = Output::secret("value".to_string()).unsecret();
        assert!(!out.resolve().await.unwrap().secret);
    }

    #[tokio::test]
    async fn test_try_apply_error_surfaces() {
        let out: Output<u32> = Output::known(1u32).try_apply(|_| {
            Err(CoreError::MissingSecretKey {
                key: "adminpass".to_string(),
            })
        });
        let err = out.resolve().await.unwrap_err();
        assert!(matches!(err, CoreError::MissingSecretKey { .. }));
    }

    #[tokio::test]
    async fn test_shared_error_seen_by_every_consumer() {
        let failing: Output<u32> = Output::from_future(async {
            Err(CoreError::StackNotFound {
                stack: "org/kubeconfig/dev".to_string(),
            })
        });
        let a = failing.clone();
        let b = failing;
        let err_a = a.resolve().await.unwrap_err();
        let err_b = b.resolve().await.unwrap_err();
        assert!(matches!(err_a.root(), CoreError::StackNotFound { .. }));
        assert!(matches!(err_b.root(), CoreError::StackNotFound { .. }));
    }

    #[tokio::test]
    async fn test_pending_resolved_later() {
        let (out, resolver) = Output::<String>::pending(release_id("prometheus"));
        let derived = out.concat("-prometheus-server");
        assert!(derived.peek().is_none());

        resolver.resolve("prometheus".to_string());
        assert_eq!(derived.value().await.unwrap(), "prometheus-prometheus-server");
    }

    #[tokio::test]
    async fn test_pending_dropped_resolver_fails() {
        let (out, resolver) = Output::<String>::pending(release_id("statsd"));
        drop(resolver);
        let err = out.resolve().await.unwrap_err();
        assert!(matches!(err, CoreError::Unresolved { .. }));
    }

    #[tokio::test]
    async fn test_dependencies_follow_derivations() {
        let (prom, _r1) = Output::<String>::pending(release_id("prometheus"));
        let (statsd, _r2) = Output::<String>::pending(release_id("statsd"));

        let zipped = prom.apply(|s| s.len()).zip(statsd);
        let deps: Vec<_> = zipped.dependencies().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(deps, vec!["prometheus", "statsd"]);
    }

    #[tokio::test]
    async fn test_zip_secret_if_either_secret() {
        let out = Output::known(1u8).zip(Output::secret(2u8));
        let resolved = out.resolve().await.unwrap();
        assert_eq!(resolved.value, (1, 2));
        assert!(resolved.secret);
    }

    #[tokio::test]
    async fn test_all_collects_in_order() {
        let out = Output::all(vec![Output::known(1), Output::known(2), Output::known(3)]);
        assert_eq!(out.value().await.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_peek_known() {
        let out = Output::known("x".to_string());
        assert_eq!(out.peek().unwrap().value, "x");
    }
}

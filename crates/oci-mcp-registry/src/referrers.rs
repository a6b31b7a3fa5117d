//! Referrer graph resolution.
//!
//! Starting from a root descriptor, [`resolve_referrers`] discovers every
//! artifact that refers to it, transitively, and returns the result as a tree
//! in which each digest appears once, under the node that discovered it
//! first. Cycles and repeated edges reported by a registry are dropped.
//!
//! The traversal is depth-first pre-order with an explicit stack. Nodes live
//! in an arena while the graph is explored and the owned tree is assembled
//! bottom-up afterwards, so neither phase recurses.

use std::collections::HashSet;
use std::ops::Range;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{RegistryError, Result};
use crate::oci::Descriptor;

/// A source of referrers for a subject descriptor.
///
/// Implementations exhaust every page of the underlying query and hand each
/// page to `on_batch` in discovery order. An error returned by `on_batch`
/// aborts the query and is propagated.
#[async_trait]
pub trait ReferrerSource: Send + Sync {
    /// Lists the descriptors referring to `subject`, optionally restricted to
    /// one artifact type.
    async fn referrers(
        &self,
        subject: &Descriptor,
        artifact_type: Option<&str>,
        on_batch: &mut (dyn FnMut(Vec<Descriptor>) -> Result<()> + Send),
    ) -> Result<()>;
}

/// A descriptor together with its direct referrers.
///
/// Serializes as the descriptor's fields plus a `referrers` array, which is
/// present (possibly empty) at every level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReferrerNode {
    /// The artifact at this node.
    #[serde(flatten)]
    pub descriptor: Descriptor,

    /// Direct referrers, in discovery order.
    #[serde(default)]
    pub referrers: Vec<ReferrerNode>,
}

impl ReferrerNode {
    /// Creates a node without referrers.
    #[must_use]
    pub const fn new(descriptor: Descriptor) -> Self {
        Self {
            descriptor,
            referrers: Vec::new(),
        }
    }

    /// Returns the number of nodes in the tree, including this one.
    #[must_use]
    pub fn count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            pending.extend(&node.referrers);
        }
        count
    }
}

/// Arena entry: a discovered descriptor and the arena range of its children.
struct Slot {
    descriptor: Descriptor,
    children: Range<usize>,
}

/// Resolves the referrer tree rooted at `root`.
///
/// Every unique digest is queried exactly once, with `artifact_type` passed
/// through to every query. The first failing query aborts the traversal and
/// no partial tree is returned.
///
/// # Errors
///
/// - [`RegistryError::InvalidDigest`] if the root digest is malformed; no
///   query is issued.
/// - [`RegistryError::Cancelled`] if `cancel` fires before or during a query.
/// - Any error returned by `source`.
pub async fn resolve_referrers<S>(
    root: &Descriptor,
    artifact_type: Option<&str>,
    source: &S,
    cancel: &CancellationToken,
) -> Result<ReferrerNode>
where
    S: ReferrerSource + ?Sized,
{
    root.parsed_digest()?;

    let mut arena = vec![Slot {
        descriptor: root.clone(),
        children: 0..0,
    }];
    let mut visited: HashSet<String> = HashSet::from([root.digest.clone()]);
    let mut stack = vec![0_usize];
    let mut queries = 0_usize;

    while let Some(current) = stack.pop() {
        if cancel.is_cancelled() {
            return Err(RegistryError::Cancelled);
        }

        let subject = arena[current].descriptor.clone();
        tracing::debug!(digest = %subject.digest, artifact_type, "Querying referrers");
        queries += 1;

        let mut discovered = Vec::new();
        {
            let mut on_batch = |batch: Vec<Descriptor>| -> Result<()> {
                discovered.extend(batch);
                Ok(())
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RegistryError::Cancelled),
                result = source.referrers(&subject, artifact_type, &mut on_batch) => result?,
            }
        }

        let first = arena.len();
        for descriptor in discovered {
            if let Err(e) = descriptor.parsed_digest() {
                tracing::warn!(subject = %subject.digest, error = %e, "Skipping referrer with invalid digest");
                continue;
            }
            if !visited.insert(descriptor.digest.clone()) {
                continue;
            }
            arena.push(Slot {
                descriptor,
                children: 0..0,
            });
        }
        let children = first..arena.len();
        arena[current].children = children.clone();

        // Reversed so the first child is expanded next.
        stack.extend(children.rev());
    }

    tracing::info!(
        root = %root.digest,
        nodes = arena.len(),
        queries,
        "Resolved referrer graph"
    );

    let root_children = arena[0].children.clone();
    let mut built = assemble(arena);
    Ok(ReferrerNode {
        descriptor: root.clone(),
        referrers: take_children(&mut built, root_children),
    })
}

/// Builds the owned subtrees of every non-root arena slot.
///
/// Children always sit at higher indices than their parent, so walking the
/// arena backwards builds every subtree before it is needed.
fn assemble(arena: Vec<Slot>) -> Vec<Option<ReferrerNode>> {
    let mut built: Vec<Option<ReferrerNode>> = Vec::new();
    built.resize_with(arena.len(), || None);

    for (index, slot) in arena.into_iter().enumerate().skip(1).rev() {
        let referrers = take_children(&mut built, slot.children);
        built[index] = Some(ReferrerNode {
            descriptor: slot.descriptor,
            referrers,
        });
    }
    built
}

fn take_children(built: &mut [Option<ReferrerNode>], children: Range<usize>) -> Vec<ReferrerNode> {
    built[children].iter_mut().filter_map(Option::take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;
    use crate::oci::MediaType;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    const SBOM: &str = "application/vnd.example.sbom";

    fn digest_of(name: &str) -> String {
        Digest::from_bytes(name.as_bytes()).to_string()
    }

    fn desc(name: &str) -> Descriptor {
        Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), digest_of(name), 100)
            .with_artifact_type(SBOM)
            .with_annotation("name", name)
    }

    #[derive(Default)]
    struct FakeSource {
        pages: HashMap<String, Vec<Vec<Descriptor>>>,
        fail_on: Option<String>,
        hang_on: Option<String>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeSource {
        fn with(mut self, subject: &str, pages: Vec<Vec<Descriptor>>) -> Self {
            self.pages.insert(digest_of(subject), pages);
            self
        }

        fn calls(&self) -> Vec<String> {
            let names: HashMap<String, String> = ["R", "A", "B", "C", "D", "E", "X", "Y"]
                .iter()
                .map(|n| (digest_of(n), (*n).to_string()))
                .collect();
            self.calls
                .lock()
                .iter()
                .map(|(digest, _)| names.get(digest).cloned().unwrap_or_else(|| digest.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl ReferrerSource for FakeSource {
        async fn referrers(
            &self,
            subject: &Descriptor,
            artifact_type: Option<&str>,
            on_batch: &mut (dyn FnMut(Vec<Descriptor>) -> Result<()> + Send),
        ) -> Result<()> {
            self.calls
                .lock()
                .push((subject.digest.clone(), artifact_type.map(ToString::to_string)));

            if self.hang_on.as_deref() == Some(subject.digest.as_str()) {
                std::future::pending::<()>().await;
            }
            if self.fail_on.as_deref() == Some(subject.digest.as_str()) {
                return Err(RegistryError::HttpError {
                    status: 500,
                    message: "boom".to_string(),
                });
            }

            for page in self.pages.get(&subject.digest).cloned().unwrap_or_default() {
                on_batch(page)?;
            }
            Ok(())
        }
    }

    fn names(node: &ReferrerNode) -> Vec<String> {
        node.referrers
            .iter()
            .map(|n| n.descriptor.annotations.as_ref().unwrap()["name"].clone())
            .collect()
    }

    #[tokio::test]
    async fn test_cycle_back_to_root() {
        let source = FakeSource::default()
            .with("R", vec![vec![desc("A"), desc("B")]])
            .with("A", vec![vec![desc("C")]])
            .with("C", vec![vec![desc("R")]]);

        let tree = resolve_referrers(&desc("R"), None, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.calls(), vec!["R", "A", "C", "B"]);
        assert_eq!(names(&tree), vec!["A", "B"]);
        assert_eq!(names(&tree.referrers[0]), vec!["C"]);
        assert!(tree.referrers[0].referrers[0].referrers.is_empty());
        assert!(tree.referrers[1].referrers.is_empty());
        assert_eq!(tree.count(), 4);
    }

    #[tokio::test]
    async fn test_self_reference() {
        let source = FakeSource::default().with("R", vec![vec![desc("R")]]);

        let tree = resolve_referrers(&desc("R"), None, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.calls(), vec!["R"]);
        assert!(tree.referrers.is_empty());
    }

    #[tokio::test]
    async fn test_first_discovery_wins() {
        // D is reachable from both A and B, and listed twice under B.
        let source = FakeSource::default()
            .with("R", vec![vec![desc("A")], vec![desc("B")]])
            .with("A", vec![vec![desc("D")]])
            .with("B", vec![vec![desc("D"), desc("E"), desc("E")]]);

        let tree = resolve_referrers(&desc("R"), None, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.calls(), vec!["R", "A", "D", "B", "E"]);
        assert_eq!(names(&tree), vec!["A", "B"]);
        assert_eq!(names(&tree.referrers[0]), vec!["D"]);
        assert_eq!(names(&tree.referrers[1]), vec!["E"]);
        assert_eq!(tree.count(), 5);
    }

    #[tokio::test]
    async fn test_fail_fast() {
        let mut source = FakeSource::default()
            .with("R", vec![vec![desc("A"), desc("B"), desc("C"), desc("D")]]);
        source.fail_on = Some(digest_of("B"));

        let err = resolve_referrers(&desc("R"), None, &source, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::HttpError { status: 500, .. }));
        assert_eq!(source.calls(), vec!["R", "A", "B"]);
    }

    #[tokio::test]
    async fn test_filter_passed_to_every_query() {
        let source = FakeSource::default()
            .with("R", vec![vec![desc("A")]])
            .with("A", vec![vec![desc("B")]]);

        resolve_referrers(&desc("R"), Some(SBOM), &source, &CancellationToken::new())
            .await
            .unwrap();

        let calls = source.calls.lock().clone();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(_, filter)| filter.as_deref() == Some(SBOM)));
    }

    #[tokio::test]
    async fn test_invalid_root_digest() {
        let source = FakeSource::default();
        let root = Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), "sha256:nope", 1);

        let err = resolve_referrers(&root, None, &source, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::InvalidDigest { .. }));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_child_digest_skipped() {
        let bad = Descriptor::new(MediaType::new(MediaType::OCI_MANIFEST), "sha256:zz", 1);
        let source = FakeSource::default().with("R", vec![vec![bad, desc("A")]]);

        let tree = resolve_referrers(&desc("R"), None, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(names(&tree), vec!["A"]);
        assert_eq!(source.calls(), vec!["R", "A"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let source = FakeSource::default().with("R", vec![vec![desc("A")]]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolve_referrers(&desc("R"), None, &source, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_while_in_flight() {
        let mut source = FakeSource::default()
            .with("R", vec![vec![desc("A"), desc("B")]]);
        source.hang_on = Some(digest_of("A"));
        let source = Arc::new(source);
        let cancel = CancellationToken::new();

        let task = {
            let source = Arc::clone(&source);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                resolve_referrers(&desc("R"), None, source.as_ref(), &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(source.calls(), vec!["R", "A"]);
    }

    #[tokio::test]
    async fn test_serialized_shape() {
        let source = FakeSource::default().with("R", vec![vec![desc("A")]]);

        let tree = resolve_referrers(&desc("R"), None, &source, &CancellationToken::new())
            .await
            .unwrap();
        let json = serde_json::to_value(&tree).unwrap();

        assert_eq!(json["digest"], digest_of("R"));
        assert_eq!(json["mediaType"], MediaType::OCI_MANIFEST);
        assert_eq!(json["artifactType"], SBOM);
        assert_eq!(json["referrers"][0]["digest"], digest_of("A"));
        assert_eq!(json["referrers"][0]["referrers"], serde_json::json!([]));
        assert!(json.get("descriptor").is_none());
    }

    #[tokio::test]
    async fn test_long_chain() {
        let mut source = FakeSource::default();
        for i in 0..200 {
            source = source.with(&format!("n{i}"), vec![vec![desc(&format!("n{}", i + 1))]]);
        }

        let tree = resolve_referrers(&desc("n0"), None, &source, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tree.count(), 201);
        assert_eq!(source.calls.lock().len(), 201);
    }
}

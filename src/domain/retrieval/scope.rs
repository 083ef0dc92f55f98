//! Authorization of knowledge-base sets for a query
//!
//! Index searches only accept an [`AuthorizedScope`], and the only way to
//! obtain one is [`AuthorizedScope::resolve`], so a search cannot reach a
//! knowledge base its caller does not own.

use std::collections::BTreeSet;

use crate::domain::knowledge_base::{KnowledgeBase, KnowledgeBaseId, OwnerId};
use crate::domain::DomainError;

/// Knowledge bases a single owner may query
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizedScope {
    owner: OwnerId,
    knowledge_bases: Vec<KnowledgeBase>,
}

impl AuthorizedScope {
    /// Check the requested ids against the knowledge bases found in storage
    ///
    /// A single requested knowledge base must exist and be owned by the
    /// caller. With several, unauthorized or missing ones are dropped and the
    /// call fails only when none remain.
    pub fn resolve(
        owner: &OwnerId,
        requested: &[KnowledgeBaseId],
        found: Vec<KnowledgeBase>,
    ) -> Result<Self, DomainError> {
        let requested: BTreeSet<&KnowledgeBaseId> = requested.iter().collect();

        if requested.is_empty() {
            return Err(DomainError::validation(
                "at least one knowledge base must be requested",
            ));
        }

        let mut knowledge_bases: Vec<KnowledgeBase> = found
            .into_iter()
            .filter(|kb| requested.contains(kb.id()) && kb.is_owned_by(owner))
            .collect();
        knowledge_bases.sort_by(|a, b| a.id().cmp(b.id()));
        knowledge_bases.dedup_by(|a, b| a.id() == b.id());

        if knowledge_bases.is_empty() {
            let message = if requested.len() == 1 {
                format!(
                    "knowledge base '{}' is not accessible to '{}'",
                    requested.iter().next().map(|id| id.as_str()).unwrap_or_default(),
                    owner
                )
            } else {
                format!("none of the requested knowledge bases are accessible to '{}'", owner)
            };
            return Err(DomainError::authorization(message));
        }

        if knowledge_bases.len() < requested.len() {
            tracing::debug!(
                owner = %owner,
                requested = requested.len(),
                authorized = knowledge_bases.len(),
                "Excluded unauthorized knowledge bases from query"
            );
        }

        Ok(Self {
            owner: owner.clone(),
            knowledge_bases,
        })
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn knowledge_bases(&self) -> &[KnowledgeBase] {
        &self.knowledge_bases
    }

    pub fn ids(&self) -> Vec<KnowledgeBaseId> {
        self.knowledge_bases.iter().map(|kb| kb.id().clone()).collect()
    }

    pub fn get(&self, id: &KnowledgeBaseId) -> Option<&KnowledgeBase> {
        self.knowledge_bases.iter().find(|kb| kb.id() == id)
    }

    pub fn contains(&self, id: &KnowledgeBaseId) -> bool {
        self.get(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(id: &str) -> OwnerId {
        OwnerId::new(id).unwrap()
    }

    fn kb(id: &str, owner_id: &str) -> KnowledgeBase {
        KnowledgeBase::with_id(KnowledgeBaseId::new(id).unwrap(), owner(owner_id), id).unwrap()
    }

    fn ids(list: &[&str]) -> Vec<KnowledgeBaseId> {
        list.iter().map(|s| KnowledgeBaseId::new(*s).unwrap()).collect()
    }

    #[test]
    fn test_single_owned_kb() {
        let scope =
            AuthorizedScope::resolve(&owner("alice"), &ids(&["kb-a"]), vec![kb("kb-a", "alice")])
                .unwrap();

        assert_eq!(scope.ids(), ids(&["kb-a"]));
        assert!(scope.contains(&KnowledgeBaseId::new("kb-a").unwrap()));
    }

    #[test]
    fn test_single_foreign_kb_is_denied() {
        let result =
            AuthorizedScope::resolve(&owner("alice"), &ids(&["kb-b"]), vec![kb("kb-b", "bob")]);

        assert!(matches!(result, Err(DomainError::Authorization { .. })));
    }

    #[test]
    fn test_single_missing_kb_is_denied() {
        let result = AuthorizedScope::resolve(&owner("alice"), &ids(&["kb-x"]), vec![]);
        assert!(result.unwrap_err().is_authorization());
    }

    #[test]
    fn test_multi_kb_drops_foreign() {
        let scope = AuthorizedScope::resolve(
            &owner("alice"),
            &ids(&["kb-a", "kb-b", "kb-c"]),
            vec![kb("kb-a", "alice"), kb("kb-b", "bob"), kb("kb-c", "alice")],
        )
        .unwrap();

        assert_eq!(scope.ids(), ids(&["kb-a", "kb-c"]));
    }

    #[test]
    fn test_multi_kb_all_foreign_is_denied() {
        let result = AuthorizedScope::resolve(
            &owner("alice"),
            &ids(&["kb-b", "kb-d"]),
            vec![kb("kb-b", "bob"), kb("kb-d", "dave")],
        );

        assert!(result.unwrap_err().is_authorization());
    }

    #[test]
    fn test_unrequested_kbs_are_ignored() {
        let scope = AuthorizedScope::resolve(
            &owner("alice"),
            &ids(&["kb-a"]),
            vec![kb("kb-a", "alice"), kb("kb-z", "alice")],
        )
        .unwrap();

        assert_eq!(scope.knowledge_bases().len(), 1);
    }

    #[test]
    fn test_duplicate_request_counts_once() {
        let result = AuthorizedScope::resolve(
            &owner("alice"),
            &ids(&["kb-b", "kb-b"]),
            vec![kb("kb-b", "bob")],
        );

        assert!(result.unwrap_err().is_authorization());
    }

    #[test]
    fn test_empty_request_is_invalid() {
        let result = AuthorizedScope::resolve(&owner("alice"), &[], vec![]);
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }
}

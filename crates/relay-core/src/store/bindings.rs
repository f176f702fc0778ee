use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{domain::ChatId, Result};

use super::JsonDocument;

/// Number of trailing id characters used for a derived ticket.
const TICKET_SUFFIX_LEN: usize = 4;

/// Assignment of one curator to a student, with the student's ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub student: ChatId,
    pub curator: ChatId,
    pub ticket: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StudentEntry {
    curator: i64,
    ticket: String,
}

/// `mappings.json`: students keyed by id plus the curator roster.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct MappingsDoc {
    #[serde(default)]
    students: BTreeMap<String, StudentEntry>,
    #[serde(default)]
    curators: BTreeMap<String, Vec<i64>>,
}

impl MappingsDoc {
    fn binding(sid: &str, entry: &StudentEntry) -> Option<Binding> {
        let student = sid.parse::<i64>().ok()?;
        Some(Binding {
            student: ChatId(student),
            curator: ChatId(entry.curator),
            ticket: entry.ticket.clone(),
        })
    }

    fn roster_remove(&mut self, curator: i64, student: i64) {
        if let Some(list) = self.curators.get_mut(&curator.to_string()) {
            list.retain(|s| *s != student);
        }
    }

    fn roster_add(&mut self, curator: i64, student: i64) {
        let list = self.curators.entry(curator.to_string()).or_default();
        if !list.contains(&student) {
            list.push(student);
        }
    }
}

/// `prefix` + the last four characters of the decimal id.
///
/// Two ids sharing a suffix get the same ticket; nothing detects that.
pub fn derive_ticket(prefix: &str, student: ChatId) -> String {
    let id = student.0.to_string();
    let tail = &id[id.len().saturating_sub(TICKET_SUFFIX_LEN)..];
    format!("{prefix}{tail}")
}

/// Student ↔ curator bindings.
///
/// The curator roster is a denormalized back-reference of the student table;
/// it is only ever changed here, in the same critical section as the table.
/// A curator key stays in the roster (possibly empty) once created: that key
/// is what marks an identity as a curator.
pub struct BindingStore {
    doc: JsonDocument<MappingsDoc>,
}

impl BindingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    pub async fn resolve(&self, student: ChatId) -> Result<Option<Binding>> {
        let doc = self.doc.read().await?;
        let key = student.0.to_string();
        Ok(doc
            .students
            .get(&key)
            .and_then(|e| MappingsDoc::binding(&key, e)))
    }

    /// Upsert the binding of `student`. Without an explicit `ticket`, one is
    /// derived from `ticket_prefix` and the student id.
    pub async fn bind(
        &self,
        student: ChatId,
        curator: ChatId,
        ticket: Option<String>,
        ticket_prefix: &str,
    ) -> Result<Binding> {
        let ticket = ticket
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| derive_ticket(ticket_prefix, student));

        self.doc
            .update(|doc| {
                let key = student.0.to_string();
                let previous = doc.students.insert(
                    key,
                    StudentEntry {
                        curator: curator.0,
                        ticket: ticket.clone(),
                    },
                );
                if let Some(prev) = previous.filter(|p| p.curator != curator.0) {
                    doc.roster_remove(prev.curator, student.0);
                }
                doc.roster_add(curator.0, student.0);

                Binding {
                    student,
                    curator,
                    ticket,
                }
            })
            .await
    }

    /// Existing binding of `student`, or a new one to `default_curator`,
    /// decided in one critical section so a concurrent `bind` is never
    /// overwritten. The flag is `true` when the binding was created here.
    pub async fn resolve_or_bind(
        &self,
        student: ChatId,
        default_curator: ChatId,
        ticket_prefix: &str,
    ) -> Result<(Binding, bool)> {
        self.doc
            .update(|doc| {
                let key = student.0.to_string();
                if let Some(b) = doc
                    .students
                    .get(&key)
                    .and_then(|e| MappingsDoc::binding(&key, e))
                {
                    return (b, false);
                }
                let ticket = derive_ticket(ticket_prefix, student);
                doc.students.insert(
                    key,
                    StudentEntry {
                        curator: default_curator.0,
                        ticket: ticket.clone(),
                    },
                );
                doc.roster_add(default_curator.0, student.0);
                let b = Binding {
                    student,
                    curator: default_curator,
                    ticket,
                };
                (b, true)
            })
            .await
    }

    /// Remove the binding; returns whether one existed.
    pub async fn unbind(&self, student: ChatId) -> Result<bool> {
        self.doc
            .update(|doc| match doc.students.remove(&student.0.to_string()) {
                Some(prev) => {
                    doc.roster_remove(prev.curator, student.0);
                    true
                }
                None => false,
            })
            .await
    }

    /// First student whose ticket equals `ticket`.
    pub async fn resolve_by_ticket(&self, ticket: &str) -> Result<Option<ChatId>> {
        let doc = self.doc.read().await?;
        Ok(doc
            .students
            .iter()
            .find(|(_, e)| e.ticket == ticket)
            .and_then(|(sid, _)| sid.parse::<i64>().ok())
            .map(ChatId))
    }

    pub async fn list_for_curator(&self, curator: ChatId) -> Result<Vec<Binding>> {
        let doc = self.doc.read().await?;
        Ok(doc
            .students
            .iter()
            .filter(|(_, e)| e.curator == curator.0)
            .filter_map(|(sid, e)| MappingsDoc::binding(sid, e))
            .collect())
    }

    pub async fn list_all(&self) -> Result<Vec<Binding>> {
        let doc = self.doc.read().await?;
        Ok(doc
            .students
            .iter()
            .filter_map(|(sid, e)| MappingsDoc::binding(sid, e))
            .collect())
    }

    /// Whether `id` appears in the curator roster.
    pub async fn is_curator(&self, id: ChatId) -> Result<bool> {
        let doc = self.doc.read().await?;
        Ok(doc.curators.contains_key(&id.0.to_string()))
    }

    /// Students listed in the roster of `curator`.
    pub async fn roster(&self, curator: ChatId) -> Result<Vec<ChatId>> {
        let doc = self.doc.read().await?;
        Ok(doc
            .curators
            .get(&curator.0.to_string())
            .map(|l| l.iter().copied().map(ChatId).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> BindingStore {
        BindingStore::new(dir.path().join("mappings.json"))
    }

    #[test]
    fn ticket_is_prefix_plus_last_four_digits() {
        assert_eq!(derive_ticket("S", ChatId(123456789)), "S6789");
        assert_eq!(derive_ticket("ST-", ChatId(1000)), "ST-1000");
        assert_eq!(derive_ticket("S", ChatId(42)), "S42");
        assert_eq!(derive_ticket("", ChatId(98765)), "8765");
    }

    #[tokio::test]
    async fn bind_then_resolve_then_unbind() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        let b = s
            .bind(ChatId(555001234), ChatId(9), None, "S")
            .await
            .unwrap();
        assert_eq!(b.ticket, "S1234");
        assert_eq!(s.resolve(ChatId(555001234)).await.unwrap(), Some(b));

        assert!(s.unbind(ChatId(555001234)).await.unwrap());
        assert_eq!(s.resolve(ChatId(555001234)).await.unwrap(), None);
        assert!(!s.unbind(ChatId(555001234)).await.unwrap());
    }

    #[tokio::test]
    async fn explicit_ticket_overrides_derivation() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        let b = s
            .bind(ChatId(11112222), ChatId(9), Some("VIP".to_string()), "S")
            .await
            .unwrap();
        assert_eq!(b.ticket, "VIP");
        assert_eq!(
            s.resolve_by_ticket("VIP").await.unwrap(),
            Some(ChatId(11112222))
        );
    }

    #[tokio::test]
    async fn rebind_moves_student_between_rosters() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        s.bind(ChatId(100), ChatId(1), None, "S").await.unwrap();
        s.bind(ChatId(100), ChatId(2), None, "S").await.unwrap();

        assert!(s.roster(ChatId(1)).await.unwrap().is_empty());
        assert_eq!(s.roster(ChatId(2)).await.unwrap(), vec![ChatId(100)]);
        assert!(s.is_curator(ChatId(1)).await.unwrap());
        assert_eq!(s.list_for_curator(ChatId(1)).await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn repeated_bind_does_not_duplicate_roster_entry() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        s.bind(ChatId(100), ChatId(1), None, "S").await.unwrap();
        s.bind(ChatId(100), ChatId(1), None, "S").await.unwrap();
        assert_eq!(s.roster(ChatId(1)).await.unwrap(), vec![ChatId(100)]);
    }

    #[tokio::test]
    async fn unbind_keeps_curator_key() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        s.bind(ChatId(100), ChatId(1), None, "S").await.unwrap();
        s.unbind(ChatId(100)).await.unwrap();
        assert!(s.is_curator(ChatId(1)).await.unwrap());
        assert!(s.roster(ChatId(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn colliding_suffixes_share_a_ticket_and_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        let a = s.bind(ChatId(11234), ChatId(1), None, "S").await.unwrap();
        let b = s.bind(ChatId(21234), ChatId(1), None, "S").await.unwrap();
        assert_eq!(a.ticket, b.ticket);
        assert_eq!(
            s.resolve_by_ticket("S1234").await.unwrap(),
            Some(ChatId(11234))
        );
        assert_eq!(s.resolve_by_ticket("S9999").await.unwrap(), None);
    }

    #[tokio::test]
    async fn listing_per_curator_and_all() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        s.bind(ChatId(10), ChatId(1), None, "S").await.unwrap();
        s.bind(ChatId(20), ChatId(2), None, "S").await.unwrap();
        s.bind(ChatId(30), ChatId(1), None, "S").await.unwrap();

        let mine: Vec<_> = s
            .list_for_curator(ChatId(1))
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.student)
            .collect();
        assert_eq!(mine, vec![ChatId(10), ChatId(30)]);
        assert_eq!(s.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn resolve_or_bind_keeps_existing_binding() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);

        let (b, created) = s
            .resolve_or_bind(ChatId(5550001), ChatId(111), "S")
            .await
            .unwrap();
        assert!(created);
        assert_eq!(b.curator, ChatId(111));
        assert_eq!(b.ticket, "S0001");
        assert_eq!(s.roster(ChatId(111)).await.unwrap(), vec![ChatId(5550001)]);

        s.bind(ChatId(5550001), ChatId(222), None, "S")
            .await
            .unwrap();
        let (b, created) = s
            .resolve_or_bind(ChatId(5550001), ChatId(111), "S")
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(b.curator, ChatId(222));
        assert!(s.roster(ChatId(111)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_bind_racing_default_bind_always_survives() {
        for _ in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let s = std::sync::Arc::new(store(&dir));

            let lazy = {
                let s = s.clone();
                tokio::spawn(async move {
                    s.resolve_or_bind(ChatId(77), ChatId(111), "S").await
                })
            };
            let explicit = {
                let s = s.clone();
                tokio::spawn(async move {
                    s.bind(ChatId(77), ChatId(222), None, "S").await
                })
            };
            lazy.await.unwrap().unwrap();
            explicit.await.unwrap().unwrap();

            let b = s.resolve(ChatId(77)).await.unwrap().unwrap();
            assert_eq!(b.curator, ChatId(222));
            assert_eq!(s.roster(ChatId(222)).await.unwrap(), vec![ChatId(77)]);
            assert!(s.roster(ChatId(111)).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn concurrent_binds_keep_roster_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let s = std::sync::Arc::new(store(&dir));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let s = s.clone();
            tasks.push(tokio::spawn(async move {
                s.bind(ChatId(1000 + i), ChatId(7), None, "S")
                    .await
                    .unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let mut roster = s.roster(ChatId(7)).await.unwrap();
        roster.sort();
        let expected: Vec<_> = (0..16).map(|i| ChatId(1000 + i)).collect();
        assert_eq!(roster, expected);
        assert_eq!(s.list_all().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn persisted_shape_matches_mappings_format() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir);
        s.bind(ChatId(123456), ChatId(42), None, "S").await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("mappings.json")).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["students"]["123456"]["curator"], 42);
        assert_eq!(v["students"]["123456"]["ticket"], "S3456");
        assert_eq!(v["curators"]["42"], serde_json::json!([123456]));
    }
}

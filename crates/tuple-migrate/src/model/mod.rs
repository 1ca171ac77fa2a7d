//! Matching model: how target tuples are built from source rows.
//!
//! The model is a YAML or JSON document listing the target [`Tuple`]s (each
//! naming its parent tuple), their column [`Match`]es and join
//! [`Reference`]s, plus the global [`ValueMatchTable`].

pub mod token;
pub mod tree;
pub mod validation;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{MigrateError, Result};

pub use token::{DefaultValue, ReferencedValue, ValueMatchId, YesNo};
pub use tree::{NodeId, TreeNode, TupleTree};

use token::{RawToken, UNMATCHED};

/// A `table.column` pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    /// `table.column`, as used in select lists and predicates.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// Target side of a match.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetColumn {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub datatype: String,
}

/// Source side of a match.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceColumn {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub datatype: String,
    /// When `NO`, a NULL source value falls back to the match default.
    #[serde(default = "default_required", alias = "isRequired")]
    pub is_required: YesNo,
}

impl SourceColumn {
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

fn default_required() -> YesNo {
    YesNo::Yes
}

/// A join or filter edge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reference {
    pub id: u32,
    pub referenced: ColumnRef,
    #[serde(default)]
    pub referencee: Option<ColumnRef>,
    #[serde(alias = "referencedValue")]
    pub referenced_value: ReferencedValue,
    /// 0 marks a direct reference; anything else an indirect one.
    #[serde(default, deserialize_with = "deserialize_predecessor")]
    pub predecessor: u32,
}

impl Reference {
    pub fn is_direct(&self) -> bool {
        self.predecessor == 0
    }
}

fn deserialize_predecessor<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = String::from(RawToken::deserialize(deserializer)?);
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    text.parse()
        .map_err(|_| serde::de::Error::custom(format!("invalid predecessor '{}'", text)))
}

/// How one target column is filled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Match {
    pub id: u32,
    pub left: TargetColumn,
    #[serde(default)]
    pub right: Option<SourceColumn>,
    #[serde(default, alias = "defaultValue")]
    pub default_value: DefaultValue,
    #[serde(default, alias = "isPk")]
    pub is_pk: YesNo,
    #[serde(default, alias = "valueMatchId")]
    pub value_match_id: ValueMatchId,
    #[serde(default)]
    pub references: Vec<Reference>,
}

/// One target-table row specification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tuple {
    pub id: u32,
    /// Id of the enclosing tuple; `None` for the root.
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(default)]
    pub desc: String,
    pub table: String,
    #[serde(default)]
    pub terminology: String,
    #[serde(default)]
    pub matches: Vec<Match>,
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl Tuple {
    /// The match flagged `is_pk: YES`.
    pub fn pk_match(&self) -> Option<&Match> {
        self.matches.iter().find(|m| m.is_pk.is_yes())
    }
}

/// Hashable text of a scalar token, used for value-match keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(from = "RawToken")]
struct TokenText(String);

impl From<RawToken> for TokenText {
    fn from(raw: RawToken) -> Self {
        TokenText(String::from(raw))
    }
}

#[derive(Debug, Deserialize)]
struct RawValueMatchGroup {
    id: u32,
    #[serde(default)]
    values: BTreeMap<TokenText, TokenText>,
}

/// One value-match group: lowercased source value to target value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueMatchGroup {
    values: HashMap<String, String>,
}

impl ValueMatchGroup {
    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
                .collect(),
        }
    }

    /// Map a source value, falling back to the `UNMATCHED` entry.
    pub fn get(&self, source: &str) -> Option<&str> {
        self.values
            .get(&source.to_lowercase())
            .or_else(|| self.values.get(UNMATCHED))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// All value-match groups of the model, keyed by group id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueMatchTable {
    groups: HashMap<u32, ValueMatchGroup>,
}

impl<'de> Deserialize<'de> for ValueMatchTable {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Vec::<RawValueMatchGroup>::deserialize(deserializer)?;
        let mut table = ValueMatchTable::default();
        for group in raw {
            table.insert(
                group.id,
                ValueMatchGroup::new(group.values.into_iter().map(|(k, v)| (k.0, v.0))),
            );
        }
        Ok(table)
    }
}

impl ValueMatchTable {
    pub fn group(&self, id: u32) -> Option<&ValueMatchGroup> {
        self.groups.get(&id)
    }

    /// Add a group. Entries of an existing group with the same id are merged.
    pub fn insert(&mut self, id: u32, group: ValueMatchGroup) {
        self.groups
            .entry(id)
            .or_default()
            .values
            .extend(group.values);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// The parsed matching model document.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingModel {
    pub tuples: Vec<Tuple>,
    #[serde(default, alias = "valueMatches")]
    pub value_matches: ValueMatchTable,
    /// SHA256 of the document text.
    #[serde(skip)]
    pub hash: String,
}

/// A validated model ready for translation.
#[derive(Debug, Clone)]
pub struct PreparedModel {
    pub tree: TupleTree,
    pub value_matches: ValueMatchTable,
    pub hash: String,
}

impl MatchingModel {
    /// Load a model file; `.json` files are read as JSON, anything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let model = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };
        debug!(
            "Loaded matching model {} ({} tuples, {} value-match groups)",
            path.display(),
            model.tuples.len(),
            model.value_matches.len()
        );
        Ok(model)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let model: MatchingModel = serde_yaml::from_str(yaml)?;
        Ok(model.finish(yaml))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let model: MatchingModel = serde_json::from_str(json)?;
        Ok(model.finish(json))
    }

    fn finish(mut self, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        self.hash = format!("{:x}", hasher.finalize());

        for tuple in &mut self.tuples {
            tuple.references.sort_by_key(|r| r.id);
            for m in &mut tuple.matches {
                m.references.sort_by_key(|r| r.id);
            }
        }
        self
    }

    /// Build the tuple tree and validate the model against it.
    pub fn prepare(self) -> Result<PreparedModel> {
        let tree = TupleTree::build(self.tuples)?;
        validation::validate(&tree, &self.value_matches)?;
        Ok(PreparedModel {
            tree,
            value_matches: self.value_matches,
            hash: self.hash,
        })
    }
}

impl std::str::FromStr for MatchingModel {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_yaml(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"
tuples:
  - id: 1
    desc: Person
    table: person
    terminology: PERSON
    matches:
      - id: 1
        left: { table: person, column: person_id, datatype: INT }
        right: { table: t_paciente, column: nid, datatype: VARCHAR }
        default_value: AI
        is_pk: YES
        references:
          - id: 2
            referenced: { table: t_paciente, column: hdd }
            referenced_value: "1065"
            predecessor: 0
          - id: 1
            referenced: { table: t_paciente, column: nid }
            referenced_value: ALL
            predecessor: 0
      - id: 2
        left: { table: person, column: gender, datatype: VARCHAR }
        right: { table: t_paciente, column: sexo, is_required: NO }
        default_value: U
        value_match_id: 1
  - id: 2
    parent: 1
    table: patient
    matches:
      - id: 3
        left: { table: patient, column: patient_id }
        default_value: TOP
        is_pk: YES
value_matches:
  - id: 1
    values:
      Male: M
      female: F
      unmatched: U
"#;

    #[test]
    fn test_parse_yaml_model() {
        let model = MatchingModel::from_yaml(MODEL).unwrap();
        assert_eq!(model.tuples.len(), 2);
        assert_eq!(model.hash.len(), 64);

        let person = &model.tuples[0];
        assert_eq!(person.parent, None);
        let pk = person.pk_match().unwrap();
        assert_eq!(pk.id, 1);
        assert_eq!(pk.default_value, DefaultValue::Ai);
        assert_eq!(pk.right.as_ref().unwrap().is_required, YesNo::Yes);
        // references are kept sorted by id
        let ids: Vec<u32> = pk.references.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(
            pk.references[1].referenced_value,
            ReferencedValue::Literal("1065".into())
        );

        let gender = &person.matches[1];
        assert_eq!(gender.value_match_id, ValueMatchId::Group(1));
        assert_eq!(gender.right.as_ref().unwrap().is_required, YesNo::No);

        assert_eq!(model.tuples[1].parent, Some(1));
        assert_eq!(
            model.tuples[1].matches[0].default_value,
            DefaultValue::Top(1)
        );
    }

    #[test]
    fn test_value_match_lookup_is_case_insensitive() {
        let model = MatchingModel::from_yaml(MODEL).unwrap();
        let group = model.value_matches.group(1).unwrap();
        assert_eq!(group.get("mALE"), Some("M"));
        assert_eq!(group.get("FEMALE"), Some("F"));
        assert_eq!(group.get("nonbinary"), Some("U"));
        assert!(model.value_matches.group(2).is_none());
    }

    #[test]
    fn test_value_match_without_fallback() {
        let group = ValueMatchGroup::new([("male", "M")]);
        assert_eq!(group.get("Male"), Some("M"));
        assert_eq!(group.get("other"), None);
    }

    #[test]
    fn test_numeric_value_match_keys() {
        let yaml = r#"
tuples: []
value_matches:
  - id: 7
    values:
      1: "true"
      0: "false"
"#;
        let model = MatchingModel::from_yaml(yaml).unwrap();
        assert_eq!(model.value_matches.group(7).unwrap().get("1"), Some("true"));
    }

    #[test]
    fn test_parse_json_model_with_camel_case() {
        let json = r#"{
          "tuples": [{
            "id": 1, "table": "location",
            "matches": [{
              "id": 1,
              "left": {"table": "location", "column": "location_id"},
              "right": {"table": "t_hdd", "column": "hdd", "isRequired": "YES"},
              "defaultValue": "AI", "isPk": "YES", "valueMatchId": "NA",
              "references": [{
                "id": 1,
                "referenced": {"table": "t_hdd", "column": "hdd"},
                "referencedValue": "ALL", "predecessor": "0"
              }]
            }]
          }],
          "valueMatches": [{"id": 3, "values": {"Yes": "1"}}]
        }"#;
        let model = MatchingModel::from_json(json).unwrap();
        let pk = model.tuples[0].pk_match().unwrap();
        assert!(pk.references[0].is_direct());
        assert_eq!(model.value_matches.group(3).unwrap().get("yes"), Some("1"));
    }

    #[test]
    fn test_malformed_token_is_rejected() {
        let yaml = r#"
tuples:
  - id: 1
    table: person
    matches:
      - id: 1
        left: { table: person, column: person_id }
        default_value: TOPMOST
        is_pk: YES
"#;
        assert!(MatchingModel::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = MatchingModel::from_yaml(MODEL).unwrap();
        let b = MatchingModel::from_yaml(&MODEL.replace("1065", "1066")).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.yml");
        std::fs::write(&path, MODEL).unwrap();
        let model = MatchingModel::load(&path).unwrap();
        assert_eq!(model.tuples.len(), 2);

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            MatchingModel::load(missing),
            Err(MigrateError::Io(_))
        ));
    }
}

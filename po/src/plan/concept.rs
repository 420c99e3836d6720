//! Concept records

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::LoadError;
use crate::reference::{Reference, ReferenceError};

/// Closed set of syntactic/semantic concept tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConceptType {
    /// `{}`
    Object,
    /// `<>`
    Proposition,
    /// `[]`
    Relation,
    /// `:S:`
    Subject,
    /// `::()`
    Imperative,
    /// `<{}>`
    Judgement,
    /// `*every`
    OpEvery,
    /// `&across`
    OpAcross,
    /// `&in`
    OpIn,
    /// `$.`
    OpSpecify,
    /// `$+`
    OpContinuation,
    /// `$-`
    OpSelect,
    /// `$=`
    OpIdentity,
    /// `$%`
    OpAbstraction,
    /// `@if`
    OpIf,
    /// `@if!`
    OpIfNot,
    /// `@after`
    OpAfter,
}

impl ConceptType {
    pub fn parse(tag: &str, concept: &str) -> Result<Self, LoadError> {
        let t = match tag {
            "{}" => Self::Object,
            "<>" => Self::Proposition,
            "[]" => Self::Relation,
            ":S:" => Self::Subject,
            "::()" => Self::Imperative,
            "<{}>" => Self::Judgement,
            "*every" => Self::OpEvery,
            "&across" => Self::OpAcross,
            "&in" => Self::OpIn,
            "$." => Self::OpSpecify,
            "$+" => Self::OpContinuation,
            "$-" => Self::OpSelect,
            "$=" => Self::OpIdentity,
            "$%" => Self::OpAbstraction,
            "@if" => Self::OpIf,
            "@if!" => Self::OpIfNot,
            "@after" => Self::OpAfter,
            other => {
                return Err(LoadError::UnknownConceptType {
                    tag: other.to_string(),
                    concept: concept.to_string(),
                });
            }
        };
        Ok(t)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Object => "{}",
            Self::Proposition => "<>",
            Self::Relation => "[]",
            Self::Subject => ":S:",
            Self::Imperative => "::()",
            Self::Judgement => "<{}>",
            Self::OpEvery => "*every",
            Self::OpAcross => "&across",
            Self::OpIn => "&in",
            Self::OpSpecify => "$.",
            Self::OpContinuation => "$+",
            Self::OpSelect => "$-",
            Self::OpIdentity => "$=",
            Self::OpAbstraction => "$%",
            Self::OpIf => "@if",
            Self::OpIfNot => "@if!",
            Self::OpAfter => "@after",
        }
    }

    /// Operator and functional tags are always ground + invariant
    pub fn is_operator(&self) -> bool {
        !matches!(
            self,
            Self::Object | Self::Proposition | Self::Relation | Self::Subject
        )
    }
}

/// Raw concept entry as deserialized from `concept_repo.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptEntry {
    pub id: String,
    pub concept_name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub axis_name: String,
    #[serde(default)]
    pub is_ground_concept: bool,
    #[serde(default)]
    pub is_invariant: bool,
    #[serde(default)]
    pub is_final_concept: bool,
    #[serde(default)]
    pub reference_data: Option<Value>,
    #[serde(default)]
    pub reference_axis_names: Vec<String>,
    #[serde(default)]
    pub natural_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// A validated concept
#[derive(Debug, Clone)]
pub struct Concept {
    pub id: String,
    pub concept_name: String,
    pub ctype: ConceptType,
    pub axis_name: String,
    pub is_ground_concept: bool,
    pub is_invariant: bool,
    pub is_final_concept: bool,
    pub reference_data: Option<Value>,
    pub reference_axis_names: Vec<String>,
    pub natural_name: Option<String>,
    pub description: Option<String>,
    pub context: Option<String>,
}

impl Concept {
    pub fn from_entry(entry: ConceptEntry) -> Result<Self, LoadError> {
        let ctype = ConceptType::parse(&entry.type_tag, &entry.id)?;
        let mut concept = Self {
            id: entry.id,
            concept_name: entry.concept_name,
            ctype,
            axis_name: entry.axis_name,
            is_ground_concept: entry.is_ground_concept,
            is_invariant: entry.is_invariant,
            is_final_concept: entry.is_final_concept,
            reference_data: entry.reference_data,
            reference_axis_names: entry.reference_axis_names,
            natural_name: entry.natural_name,
            description: entry.description,
            context: entry.context,
        };
        // Operator and functional concepts are constants of the plan
        if concept.ctype.is_operator() {
            concept.is_ground_concept = true;
            concept.is_invariant = true;
        }
        if concept.axis_name.is_empty() {
            concept.axis_name = concept.concept_name.clone();
        }
        Ok(concept)
    }

    /// The fully-formed reference a ground concept carries from load
    pub fn initial_reference(&self) -> Result<Reference, ReferenceError> {
        match &self.reference_data {
            Some(data) => Reference::from_nested_json(data, &self.reference_axis_names),
            // Operators without data carry their own tag as a singleton
            None => Ok(Reference::singleton(crate::reference::CellValue::string(
                self.ctype.tag(),
            ))),
        }
    }

    /// A fresh empty reference shaped by the declared axis names
    pub fn fresh_reference(&self) -> Result<Reference, ReferenceError> {
        Reference::with_axes(&self.reference_axis_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(id: &str, type_tag: &str) -> ConceptEntry {
        ConceptEntry {
            id: id.to_string(),
            concept_name: format!("{{{id}}}"),
            type_tag: type_tag.to_string(),
            axis_name: String::new(),
            is_ground_concept: false,
            is_invariant: false,
            is_final_concept: false,
            reference_data: None,
            reference_axis_names: vec![],
            natural_name: None,
            description: None,
            context: None,
        }
    }

    #[test]
    fn test_type_tags_roundtrip() {
        for tag in [
            "{}", "<>", "[]", ":S:", "::()", "<{}>", "*every", "&across", "&in", "$.", "$+", "$-", "$=", "$%",
            "@if", "@if!", "@after",
        ] {
            let t = ConceptType::parse(tag, "c").unwrap();
            assert_eq!(t.tag(), tag);
        }
        assert!(ConceptType::parse("??", "c").is_err());
    }

    #[test]
    fn test_operator_forced_ground_invariant() {
        let c = Concept::from_entry(entry("op", "*every")).unwrap();
        assert!(c.is_ground_concept);
        assert!(c.is_invariant);

        let c = Concept::from_entry(entry("obj", "{}")).unwrap();
        assert!(!c.is_ground_concept);
    }

    #[test]
    fn test_axis_name_defaults_to_concept_name() {
        let c = Concept::from_entry(entry("x", "{}")).unwrap();
        assert_eq!(c.axis_name, "{x}");
    }

    #[test]
    fn test_initial_reference_from_data() {
        let mut e = entry("pair", "[]");
        e.is_ground_concept = true;
        e.reference_data = Some(json!([["4", "5", "6"], ["7", "8", "9"]]));
        e.reference_axis_names = vec!["number".into(), "digit".into()];

        let c = Concept::from_entry(e).unwrap();
        let r = c.initial_reference().unwrap();
        assert_eq!(r.axis_size("digit").unwrap(), 3);
    }

    #[test]
    fn test_entry_deserialization_defaults() {
        let c: ConceptEntry = serde_json::from_value(json!({
            "id": "c1",
            "concept_name": "{thing}",
            "type": "{}"
        }))
        .unwrap();
        assert!(!c.is_ground_concept);
        assert!(c.reference_axis_names.is_empty());
    }
}

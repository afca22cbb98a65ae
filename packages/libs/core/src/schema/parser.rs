//! 스키마 YAML 파싱 로직
//!
//! YAML 문서를 파싱하여 `SchemaRegistry`를 생성합니다.
//! 파싱 단계에서 접근 규칙, 필드 타입, 부모 참조를 모두 검증하므로
//! 레지스트리에 들어간 스키마는 이후 단계에서 다시 검증하지 않습니다.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{Error, Result};

use super::entity::{AccessRule, EntitySchema};
use super::field::{FieldSpec, FieldType, DEFAULT_STRING_MAX_LEN};
use super::registry::SchemaRegistry;

/// 스키마 파서
pub struct SchemaParser;

/// YAML 스키마 루트 (raw)
#[derive(Debug, Deserialize)]
struct RawSchema {
    #[serde(default = "default_version")]
    #[allow(dead_code)]
    version: u32,

    entities: BTreeMap<String, RawEntity>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    access_rule: String,

    #[serde(default)]
    parent: Option<String>,

    #[serde(default)]
    public: bool,

    #[serde(default)]
    fields: BTreeMap<String, RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    r#type: String,

    #[serde(default)]
    max_len: Option<u32>,

    #[serde(default)]
    values: Option<Vec<String>>,

    #[serde(default)]
    immutable: bool,
}

impl SchemaParser {
    /// 단일 YAML 문서 파싱
    pub fn parse_yaml(yaml: &str) -> Result<SchemaRegistry> {
        Self::parse_all(&[yaml])
    }

    /// 여러 YAML 문서 파싱 및 병합
    ///
    /// 문서 간 중복 엔티티는 에러입니다.
    pub fn parse_all(docs: &[&str]) -> Result<SchemaRegistry> {
        let mut entities: BTreeMap<String, EntitySchema> = BTreeMap::new();

        for doc in docs {
            let raw: RawSchema = serde_yaml::from_str(doc)?;

            for (name, raw_entity) in raw.entities {
                if entities.contains_key(&name) {
                    return Err(Error::DuplicateEntity { name });
                }

                let entity = Self::build_entity(&name, raw_entity)?;
                entities.insert(name, entity);
            }
        }

        Self::validate_parents(&entities)?;

        Ok(SchemaRegistry::new(entities))
    }

    fn build_entity(name: &str, raw: RawEntity) -> Result<EntitySchema> {
        let access_rule =
            AccessRule::from_str(&raw.access_rule).ok_or_else(|| Error::InvalidAccessRule {
                rule: raw.access_rule.clone(),
            })?;

        let mut fields = BTreeMap::new();
        for (field_name, raw_field) in raw.fields {
            let field_type = Self::build_field_type(&raw_field)?;
            let spec = FieldSpec {
                field_type,
                immutable: raw_field.immutable,
                identifier: false,
            }
            .mark_identifier(&field_name);
            fields.insert(field_name, spec);
        }

        Ok(EntitySchema {
            name: name.to_string(),
            access_rule,
            parent: raw.parent,
            public: raw.public,
            fields,
        })
    }

    fn build_field_type(raw: &RawField) -> Result<FieldType> {
        match raw.r#type.as_str() {
            "enum" => {
                let values = raw.values.clone().ok_or_else(|| Error::SchemaParse {
                    message: "enum field requires a values list".to_string(),
                })?;
                Ok(FieldType::Enum { values })
            }
            "string" => Ok(FieldType::String {
                max_len: raw.max_len.unwrap_or(DEFAULT_STRING_MAX_LEN),
            }),
            other => FieldType::from_simple_str(other).ok_or_else(|| Error::InvalidFieldType {
                type_name: other.to_string(),
            }),
        }
    }

    /// 부모 참조 검증
    ///
    /// 부모는 등록된 엔티티여야 하고, 부모 체인에 순환이 없어야 합니다.
    fn validate_parents(entities: &BTreeMap<String, EntitySchema>) -> Result<()> {
        for (name, entity) in entities {
            if let Some(parent) = &entity.parent {
                if !entities.contains_key(parent) {
                    return Err(Error::InvalidParent {
                        entity: name.clone(),
                        parent: parent.clone(),
                    });
                }
            }

            // 체인 순환 검사
            let mut current = entity.parent.as_deref();
            let mut hops = 0usize;
            while let Some(parent) = current {
                if parent == name {
                    return Err(Error::ParentCycle {
                        entity: name.clone(),
                    });
                }
                hops += 1;
                if hops > entities.len() {
                    return Err(Error::ParentCycle {
                        entity: name.clone(),
                    });
                }
                current = entities.get(parent).and_then(|p| p.parent.as_deref());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
version: 1

entities:
  projects:
    access_rule: branch
    fields:
      id: { type: number }
      name: { type: string, max_len: 120 }
      branch_id: { type: number, immutable: true }
      deleted_at: { type: date }

  tickets:
    access_rule: branch
    parent: projects
    fields:
      id: { type: number }
      project_id: { type: number }
      title: { type: string }
      status: { type: enum, values: [open, closed] }
      created_by: { type: number, immutable: true }
      deleted_at: { type: date }
"#;

    #[test]
    fn test_parse_schema_yaml() {
        let registry = SchemaParser::parse_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(registry.len(), 2);

        let tickets = registry.lookup("tickets").unwrap();
        assert_eq!(tickets.access_rule, AccessRule::Branch);
        assert_eq!(tickets.parent.as_deref(), Some("projects"));
        assert!(tickets.field("project_id").unwrap().identifier);
        assert!(tickets.field("created_by").unwrap().immutable);

        // 전역 필드 집합
        assert!(registry.all_field_names().contains("title"));
        assert!(registry.all_field_names().contains("branch_id"));
    }

    #[test]
    fn test_unknown_entity_lookup() {
        let registry = SchemaParser::parse_yaml(SAMPLE_YAML).unwrap();
        let err = registry.lookup("nope").unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_ENTITY");
    }

    #[test]
    fn test_duplicate_entity_across_docs() {
        let extra = r#"
entities:
  projects:
    access_rule: branch
    fields:
      id: { type: number }
"#;
        let err = SchemaParser::parse_all(&[SAMPLE_YAML, extra]).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_ENTITY");
    }

    #[test]
    fn test_invalid_parent() {
        let yaml = r#"
entities:
  tickets:
    access_rule: branch
    parent: missing
    fields:
      id: { type: number }
"#;
        let err = SchemaParser::parse_yaml(yaml).unwrap_err();
        assert_eq!(err.code(), "INVALID_PARENT");
    }

    #[test]
    fn test_parent_cycle() {
        let yaml = r#"
entities:
  a:
    access_rule: branch
    parent: b
    fields:
      id: { type: number }
  b:
    access_rule: branch
    parent: a
    fields:
      id: { type: number }
"#;
        let err = SchemaParser::parse_yaml(yaml).unwrap_err();
        assert_eq!(err.code(), "PARENT_CYCLE");
    }

    #[test]
    fn test_invalid_field_type() {
        let yaml = r#"
entities:
  a:
    access_rule: branch
    fields:
      id: { type: wat }
"#;
        let err = SchemaParser::parse_yaml(yaml).unwrap_err();
        assert_eq!(err.code(), "INVALID_FIELD_TYPE");
    }

    #[test]
    fn test_enum_requires_values() {
        let yaml = r#"
entities:
  a:
    access_rule: branch
    fields:
      status: { type: enum }
"#;
        let err = SchemaParser::parse_yaml(yaml).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_PARSE_ERROR");
    }
}

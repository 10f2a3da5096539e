// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde_json::{Map, Value};

use crate::filters::FilterTag;
use crate::ids::Hostname;
use crate::model::{CUSTOM_STATUS, GroupAnnotation};
use crate::query::QueryParams;

pub const SEARCH_NAME_LIMIT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    SaveSearch,
    DiscrepancyAnnotation,
    GroupAnnotation,
}

impl FormKind {
    pub const fn title(self) -> &'static str {
        match self {
            Self::SaveSearch => "Save search",
            Self::DiscrepancyAnnotation => "Annotation",
            Self::GroupAnnotation => "Group annotation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSearchInput {
    pub name: String,
    pub query: QueryParams,
    pub tags: Vec<FilterTag>,
    pub existing_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscrepancyAnnotationInput {
    pub host: Hostname,
    pub comment: String,
    pub assigned_to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAnnotationInput {
    pub host: Hostname,
    pub annotation: GroupAnnotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPayload {
    SaveSearch(SaveSearchInput),
    DiscrepancyAnnotation(DiscrepancyAnnotationInput),
    GroupAnnotation(GroupAnnotationInput),
}

impl FormPayload {
    pub fn kind(&self) -> FormKind {
        match self {
            Self::SaveSearch(_) => FormKind::SaveSearch,
            Self::DiscrepancyAnnotation(_) => FormKind::DiscrepancyAnnotation,
            Self::GroupAnnotation(_) => FormKind::GroupAnnotation,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::SaveSearch(search) => search.validate(),
            Self::DiscrepancyAnnotation(annotation) => annotation.validate(),
            Self::GroupAnnotation(annotation) => annotation.validate(),
        }
    }
}

impl SaveSearchInput {
    pub fn validate(&self) -> Result<()> {
        if self.tags.is_empty() {
            bail!("No filters are selected -- add at least one filter and retry");
        }
        let name = self.name.trim();
        if name.is_empty() {
            bail!("search name is required -- enter a name and retry");
        }
        if name.chars().count() > SEARCH_NAME_LIMIT {
            bail!("Search name must be {SEARCH_NAME_LIMIT} characters or fewer");
        }
        if self.existing_names.iter().any(|existing| existing == name) {
            bail!("A search with this name already exists");
        }
        Ok(())
    }

    /// Query entries as a JSON object; a repeated key keeps its last value.
    pub fn filters_json(&self) -> String {
        let map = self
            .query
            .iter()
            .map(|(key, value)| (key.to_owned(), Value::from(value)))
            .collect::<Map<_, _>>();
        Value::Object(map).to_string()
    }

    /// Tags as `column:term` strings.
    pub fn tags_json(&self) -> String {
        let tags = self
            .tags
            .iter()
            .map(|tag| Value::from(format!("{}:{}", tag.column, tag.term)))
            .collect::<Vec<_>>();
        Value::Array(tags).to_string()
    }
}

impl DiscrepancyAnnotationInput {
    pub fn validate(&self) -> Result<()> {
        if self.host.as_str().trim().is_empty() {
            bail!("no server selected -- pick a row and retry");
        }
        Ok(())
    }

    pub fn cleared(host: Hostname) -> Self {
        Self {
            host,
            comment: String::new(),
            assigned_to: String::new(),
        }
    }

    pub fn form_fields(&self) -> [(&'static str, &str); 2] {
        [
            ("comment", self.comment.as_str()),
            ("assigned_to", self.assigned_to.as_str()),
        ]
    }
}

impl GroupAnnotationInput {
    pub fn validate(&self) -> Result<()> {
        if self.host.as_str().trim().is_empty() {
            bail!("no server selected -- pick a row and retry");
        }
        if self.annotation.status == CUSTOM_STATUS && self.annotation.custom_status.trim().is_empty()
        {
            bail!("Please enter a custom status");
        }
        Ok(())
    }

    /// Non-custom statuses never carry a custom label.
    pub fn normalized(&self) -> GroupAnnotation {
        let mut annotation = self.annotation.clone();
        if annotation.status != CUSTOM_STATUS {
            annotation.custom_status.clear();
        }
        annotation
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DiscrepancyAnnotationInput, FormKind, FormPayload, GroupAnnotationInput, SaveSearchInput,
    };
    use crate::filters::FilterTag;
    use crate::model::GroupAnnotation;
    use crate::query::QueryParams;
    use crate::{ColumnId, Hostname};

    fn search(name: &str, tags: usize) -> SaveSearchInput {
        SaveSearchInput {
            name: name.to_owned(),
            query: QueryParams::parse("env=PROD&env=DEV&page_size=50"),
            tags: (0..tags)
                .map(|i| FilterTag {
                    column: ColumnId::from("env"),
                    term: format!("T{i}"),
                })
                .collect(),
            existing_names: vec!["prod boxes".to_owned()],
        }
    }

    #[test]
    fn save_search_requires_filters() {
        let error = search("mine", 0).validate().expect_err("no tags");
        assert!(error.to_string().starts_with("No filters are selected"));
    }

    #[test]
    fn save_search_name_rules() {
        assert!(search("a".repeat(25).as_str(), 1).validate().is_ok());
        let error = search("a".repeat(26).as_str(), 1)
            .validate()
            .expect_err("26 chars");
        assert!(error.to_string().contains("25 characters"));
        search("  ", 1).validate().expect_err("blank name");
        let error = search(" prod boxes ", 1)
            .validate()
            .expect_err("duplicate name");
        assert!(error.to_string().contains("already exists"));
    }

    #[test]
    fn save_search_serializes_filters_and_tags() {
        let input = search("mine", 2);
        assert_eq!(input.filters_json(), r#"{"env":"DEV","page_size":"50"}"#);
        assert_eq!(input.tags_json(), r#"["env:T0","env:T1"]"#);
    }

    #[test]
    fn custom_status_needs_label() {
        let mut input = GroupAnnotationInput {
            host: Hostname::from("WEB01"),
            annotation: GroupAnnotation {
                status: "custom".to_owned(),
                custom_status: " ".to_owned(),
                notes: String::new(),
                priority: "low".to_owned(),
            },
        };
        let payload = FormPayload::GroupAnnotation(input.clone());
        assert_eq!(payload.kind(), FormKind::GroupAnnotation);
        let error = payload.validate().expect_err("blank custom status");
        assert_eq!(error.to_string(), "Please enter a custom status");

        input.annotation.custom_status = "waiting on vendor".to_owned();
        assert!(input.validate().is_ok());

        input.annotation.status = "ok".to_owned();
        assert!(input.normalized().custom_status.is_empty());
    }

    #[test]
    fn cleared_annotation_posts_empty_fields() {
        let input = DiscrepancyAnnotationInput::cleared(Hostname::from("WEB01"));
        assert_eq!(input.form_fields(), [("comment", ""), ("assigned_to", "")]);
        assert!(FormPayload::DiscrepancyAnnotation(input).validate().is_ok());
    }
}

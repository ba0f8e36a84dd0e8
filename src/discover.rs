//! Turns a scope snapshot into ordered, classified field descriptors.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::scope::{FormScope, RawControl};

/// Input types that never take profile data.
const NON_FILLABLE_TYPES: &[&str] = &[
    "hidden", "submit", "button", "reset", "image", "file", "range", "color",
];

/// Identity of one control (or one radio/checkbox group) within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ControlId(String);

impl ControlId {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ControlKind {
    Text,
    Multiline,
    RadioGroup,
    CheckboxGroup,
    SingleSelect,
    MultiSelect,
}

impl ControlKind {
    /// Classify a raw control, or `None` if it is not something we fill.
    pub fn classify(control: &RawControl) -> Option<Self> {
        let input_type = control.r#type.to_ascii_lowercase();
        match control.tag.to_ascii_lowercase().as_str() {
            "textarea" => Some(ControlKind::Multiline),
            "select" if control.multiple => Some(ControlKind::MultiSelect),
            "select" => Some(ControlKind::SingleSelect),
            "input" => match input_type.as_str() {
                "radio" => Some(ControlKind::RadioGroup),
                "checkbox" => Some(ControlKind::CheckboxGroup),
                t if NON_FILLABLE_TYPES.contains(&t) => None,
                _ => Some(ControlKind::Text),
            },
            _ => None,
        }
    }

    pub fn is_text(self) -> bool {
        matches!(self, ControlKind::Text | ControlKind::Multiline)
    }

    /// Radio groups and single selects hold exactly one choice.
    pub fn is_single_choice(self) -> bool {
        matches!(self, ControlKind::RadioGroup | ControlKind::SingleSelect)
    }

    fn is_grouped(self) -> bool {
        matches!(self, ControlKind::RadioGroup | ControlKind::CheckboxGroup)
    }
}

/// One selectable option of a choice control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceOption {
    pub label: String,
    /// Element to click (group member) or the select element itself.
    pub handle: String,
    pub value: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDescriptor {
    pub id: ControlId,
    pub kind: ControlKind,
    pub label: String,
    pub value: String,
    pub options: Vec<ChoiceOption>,
    pub required: bool,
}

/// Visible, enabled controls of a kind the executor knows how to write.
pub fn is_fillable(control: &RawControl) -> bool {
    control.visible && !control.disabled && ControlKind::classify(control).is_some()
}

/// Classify, group and order every fillable control in `scope`.
pub fn discover(scope: &FormScope) -> Vec<FieldDescriptor> {
    let mut controls: Vec<(&RawControl, ControlKind)> = scope
        .controls()
        .iter()
        .filter(|c| is_fillable(c))
        .filter_map(|c| ControlKind::classify(c).map(|kind| (c, kind)))
        .collect();
    controls.sort_by(|(a, _), (b, _)| document_order(a, b));

    let mut descriptors: Vec<FieldDescriptor> = Vec::new();
    let mut groups: HashMap<(ControlKind, String), usize> = HashMap::new();

    for (control, kind) in controls {
        if kind.is_grouped() {
            let key = if control.name.is_empty() {
                (kind, format!("#{}", control.handle))
            } else {
                (kind, control.name.clone())
            };
            if let Some(&at) = groups.get(&key) {
                let group = &mut descriptors[at];
                group.options.push(group_member_option(control));
                group.required |= control.required;
                continue;
            }
            groups.insert(key, descriptors.len());
            descriptors.push(FieldDescriptor {
                id: ControlId::new(&control.handle),
                kind,
                label: group_label(control),
                value: String::new(),
                options: vec![group_member_option(control)],
                required: control.required,
            });
            continue;
        }

        let options = control
            .options
            .iter()
            .map(|o| ChoiceOption {
                label: o.label.trim().to_string(),
                handle: control.handle.clone(),
                value: o.value.clone(),
                selected: o.selected,
            })
            .collect();
        descriptors.push(FieldDescriptor {
            id: ControlId::new(&control.handle),
            kind,
            label: control_label(control),
            value: control.value.clone(),
            options,
            required: control.required,
        });
    }

    for descriptor in descriptors.iter_mut().filter(|d| d.kind.is_grouped()) {
        descriptor.value = descriptor
            .options
            .iter()
            .filter(|o| o.selected)
            .map(|o| o.label.as_str())
            .collect::<Vec<_>>()
            .join(", ");
    }

    debug!(scope = %scope.scope_id(), fields = descriptors.len(), "discovered fields");
    descriptors
}

/// Top-to-bottom, then left-to-right, then DOM order.
fn document_order(a: &RawControl, b: &RawControl) -> Ordering {
    let row = |c: &RawControl| c.rect.top.round() as i64;
    let column = |c: &RawControl| c.rect.left.round() as i64;
    row(a)
        .cmp(&row(b))
        .then_with(|| column(a).cmp(&column(b)))
        .then_with(|| a.doc_index.cmp(&b.doc_index))
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = &'a str>) -> String {
    candidates
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Label of a standalone control: id reference, enclosing label, preceding
/// text, then placeholder/title.
fn control_label(control: &RawControl) -> String {
    first_non_empty([
        control.label_by_ref.as_str(),
        control.label_enclosing.as_str(),
        control.label_preceding.as_str(),
        control.placeholder.as_str(),
        control.title.as_str(),
    ])
}

/// Label of a radio/checkbox group, taken from its first member.
fn group_label(first: &RawControl) -> String {
    first_non_empty([
        first.group_label_by_ref.as_str(),
        first.group_legend.as_str(),
        first.label_preceding.as_str(),
        first.title.as_str(),
    ])
}

fn group_member_option(member: &RawControl) -> ChoiceOption {
    let label = first_non_empty([
        member.label_by_ref.as_str(),
        member.label_enclosing.as_str(),
        member.value.as_str(),
    ]);
    ChoiceOption {
        label,
        handle: member.handle.clone(),
        value: member.value.clone(),
        selected: member.checked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Rect, RawOption, SelectionCandidate};

    fn control(handle: &str, doc_index: usize, tag: &str, ty: &str, top: f64) -> RawControl {
        RawControl {
            handle: handle.into(),
            doc_index,
            tag: tag.into(),
            r#type: ty.into(),
            visible: true,
            rect: Rect {
                top,
                left: 10.0,
                width: 100.0,
                height: 20.0,
            },
            ..Default::default()
        }
    }

    fn scope(controls: Vec<RawControl>) -> FormScope {
        FormScope::from_candidate(SelectionCandidate {
            scope_id: "scope-0".into(),
            tag: "form".into(),
            rect: Rect::default(),
            controls,
        })
        .unwrap()
    }

    #[test]
    fn label_sources_apply_in_priority_order() {
        let mut by_ref = control("af-0", 0, "input", "text", 0.0);
        by_ref.label_by_ref = "Email".into();
        by_ref.label_enclosing = "ignored".into();
        by_ref.placeholder = "ignored too".into();

        let mut preceding = control("af-1", 1, "input", "text", 30.0);
        preceding.label_preceding = "City".into();
        preceding.placeholder = "e.g. Paris".into();

        let mut placeholder_only = control("af-2", 2, "input", "email", 60.0);
        placeholder_only.placeholder = "  ".into();
        placeholder_only.title = "Work email".into();

        let bare = control("af-3", 3, "textarea", "", 90.0);

        let fields = discover(&scope(vec![by_ref, preceding, placeholder_only, bare]));
        let labels: Vec<&str> = fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["Email", "City", "Work email", ""]);
        assert_eq!(fields[3].kind, ControlKind::Multiline);
    }

    #[test]
    fn radio_members_sharing_a_name_form_one_group() {
        let mut first = control("af-0", 0, "input", "radio", 0.0);
        first.name = "degree".into();
        first.label_enclosing = "Bachelor's".into();
        first.label_preceding = "Highest degree".into();
        let mut second = control("af-1", 1, "input", "radio", 20.0);
        second.name = "degree".into();
        second.label_enclosing = "Master's".into();
        second.checked = true;
        let mut third = control("af-2", 2, "input", "radio", 40.0);
        third.name = "degree".into();
        third.value = "PhD".into();

        let fields = discover(&scope(vec![first, second, third]));
        assert_eq!(fields.len(), 1);
        let group = &fields[0];
        assert_eq!(group.kind, ControlKind::RadioGroup);
        assert_eq!(group.label, "Highest degree");
        assert_eq!(group.id.as_str(), "af-0");
        let options: Vec<&str> = group.options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(options, vec!["Bachelor's", "Master's", "PhD"]);
        assert_eq!(group.value, "Master's");
    }

    #[test]
    fn fieldset_legend_wins_over_preceding_text_for_groups() {
        let mut only = control("af-0", 0, "input", "checkbox", 0.0);
        only.name = "langs".into();
        only.group_legend = "Languages".into();
        only.label_preceding = "Something else".into();
        let fields = discover(&scope(vec![only]));
        assert_eq!(fields[0].label, "Languages");
        assert_eq!(fields[0].kind, ControlKind::CheckboxGroup);
    }

    #[test]
    fn order_is_top_to_bottom_then_left_to_right() {
        let mut right = control("af-0", 0, "input", "text", 100.0);
        right.rect.left = 300.0;
        let left = control("af-1", 1, "input", "text", 100.2);
        let top = control("af-2", 2, "input", "text", 10.0);

        let s = scope(vec![right, left, top]);
        let first: Vec<String> = discover(&s).iter().map(|f| f.id.to_string()).collect();
        assert_eq!(first, vec!["af-2", "af-1", "af-0"]);
        for _ in 0..5 {
            let again: Vec<String> = discover(&s).iter().map(|f| f.id.to_string()).collect();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn hidden_disabled_and_button_controls_are_skipped() {
        let hidden = control("af-0", 0, "input", "hidden", 0.0);
        let submit = control("af-1", 1, "input", "submit", 10.0);
        let mut disabled = control("af-2", 2, "input", "text", 20.0);
        disabled.disabled = true;
        let mut invisible = control("af-3", 3, "input", "text", 30.0);
        invisible.visible = false;
        let mut select = control("af-4", 4, "select", "select-one", 40.0);
        select.options = vec![
            RawOption {
                label: " Canada ".into(),
                value: "ca".into(),
                selected: false,
            },
            RawOption {
                label: "France".into(),
                value: "fr".into(),
                selected: true,
            },
        ];

        let fields = discover(&scope(vec![hidden, submit, disabled, invisible, select]));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].kind, ControlKind::SingleSelect);
        assert_eq!(fields[0].options[0].label, "Canada");
        assert_eq!(fields[0].options[0].handle, "af-4");
    }
}

//! 能力注册表 - 生成代码可以导入的全部模块
//!
//! Capability registry: the fixed set of modules generated code may import.
//! Built once and read-only afterwards; any specifier or name missing here is
//! rejected before evaluation starts.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use serde_json::{json, Map, Value as JsonValue};

pub const REACT: &str = "react";
pub const MANTINE: &str = "@mantine/core";

/// Hooks backed by the host's hook runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    State,
    Reducer,
    Effect,
    LayoutEffect,
    Callback,
    Memo,
    Ref,
}

impl Hook {
    pub const ALL: [Hook; 7] = [
        Hook::State,
        Hook::Reducer,
        Hook::Effect,
        Hook::LayoutEffect,
        Hook::Callback,
        Hook::Memo,
        Hook::Ref,
    ];

    pub fn export_name(self) -> &'static str {
        match self {
            Hook::State => "useState",
            Hook::Reducer => "useReducer",
            Hook::Effect => "useEffect",
            Hook::LayoutEffect => "useLayoutEffect",
            Hook::Callback => "useCallback",
            Hook::Memo => "useMemo",
            Hook::Ref => "useRef",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Hook(Hook),
    CreateElement,
    Fragment,
    /// A component rendered by the host, with the sub-components reachable
    /// as properties (`Grid.Col`).
    HostComponent { parts: &'static [&'static str] },
}

impl Capability {
    fn manifest_entry(&self) -> JsonValue {
        match self {
            Capability::Hook(hook) => json!({ "kind": "hook", "hook": hook.export_name() }),
            Capability::CreateElement => json!({ "kind": "createElement" }),
            Capability::Fragment => json!({ "kind": "fragment" }),
            Capability::HostComponent { parts } => json!({ "kind": "host", "parts": parts }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModuleSpec {
    specifier: &'static str,
    exports: BTreeMap<&'static str, Capability>,
}

impl ModuleSpec {
    fn new(specifier: &'static str) -> Self {
        Self {
            specifier,
            exports: BTreeMap::new(),
        }
    }

    fn with(mut self, name: &'static str, capability: Capability) -> Self {
        self.exports.insert(name, capability);
        self
    }

    pub fn specifier(&self) -> &'static str {
        self.specifier
    }

    pub fn has_export(&self, name: &str) -> bool {
        self.exports.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.exports.get(name)
    }

    pub fn exports(&self) -> impl Iterator<Item = (&'static str, &Capability)> {
        self.exports.iter().map(|(name, cap)| (*name, cap))
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    modules: BTreeMap<&'static str, ModuleSpec>,
}

/// `@mantine/core` components the host renders, with their compound parts.
const MANTINE_COMPONENTS: &[(&str, &[&str])] = &[
    ("Accordion", &["Item", "Control", "Panel", "Chevron"]),
    ("ActionIcon", &["Group"]),
    ("Affix", &[]),
    ("Alert", &[]),
    ("Anchor", &[]),
    ("AppShell", &["Header", "Navbar", "Aside", "Footer", "Main", "Section"]),
    ("AspectRatio", &[]),
    ("Autocomplete", &[]),
    ("Avatar", &["Group"]),
    ("BackgroundImage", &[]),
    ("Badge", &[]),
    ("Blockquote", &[]),
    ("Box", &[]),
    ("Breadcrumbs", &[]),
    ("Burger", &[]),
    ("Button", &["Group"]),
    ("Card", &["Section"]),
    ("Center", &[]),
    ("Checkbox", &["Group"]),
    ("Chip", &["Group"]),
    ("CloseButton", &[]),
    ("Code", &[]),
    ("Collapse", &[]),
    ("ColorInput", &[]),
    ("ColorPicker", &[]),
    ("ColorSwatch", &[]),
    ("Container", &[]),
    ("CopyButton", &[]),
    ("Dialog", &[]),
    ("Divider", &[]),
    ("Drawer", &[]),
    ("Fieldset", &[]),
    ("FileButton", &[]),
    ("FileInput", &[]),
    ("Flex", &[]),
    ("FocusTrap", &[]),
    ("Grid", &["Col"]),
    ("Group", &[]),
    ("Highlight", &[]),
    ("HoverCard", &["Target", "Dropdown"]),
    ("Image", &[]),
    ("Indicator", &[]),
    ("Input", &["Wrapper", "Label", "Description", "Error", "Placeholder"]),
    ("JsonInput", &[]),
    ("Kbd", &[]),
    ("List", &["Item"]),
    ("Loader", &[]),
    ("LoadingOverlay", &[]),
    ("Mark", &[]),
    ("Menu", &["Target", "Dropdown", "Item", "Label", "Divider"]),
    ("Modal", &[]),
    ("MultiSelect", &[]),
    ("NativeSelect", &[]),
    ("NavLink", &[]),
    ("Notification", &[]),
    ("NumberFormatter", &[]),
    ("NumberInput", &[]),
    ("Overlay", &[]),
    ("Pagination", &[]),
    ("Paper", &[]),
    ("PasswordInput", &[]),
    ("Pill", &["Group"]),
    ("PillsInput", &[]),
    ("PinInput", &[]),
    ("Popover", &["Target", "Dropdown"]),
    ("Progress", &["Root", "Section", "Label"]),
    ("Radio", &["Group"]),
    ("RangeSlider", &[]),
    ("Rating", &[]),
    ("RingProgress", &[]),
    ("ScrollArea", &[]),
    ("SegmentedControl", &[]),
    ("Select", &[]),
    ("SemiCircleProgress", &[]),
    ("SimpleGrid", &[]),
    ("Skeleton", &[]),
    ("Slider", &[]),
    ("Space", &[]),
    ("Spoiler", &[]),
    ("Stack", &[]),
    ("Stepper", &["Step", "Completed"]),
    ("Switch", &["Group"]),
    ("Table", &["Thead", "Tbody", "Tfoot", "Tr", "Th", "Td", "Caption", "ScrollContainer"]),
    ("Tabs", &["List", "Tab", "Panel"]),
    ("TagsInput", &[]),
    ("Text", &[]),
    ("TextInput", &[]),
    ("Textarea", &[]),
    ("ThemeIcon", &[]),
    ("Timeline", &["Item"]),
    ("Title", &[]),
    ("Tooltip", &["Group", "Floating"]),
    ("Transition", &[]),
    ("TypographyStylesProvider", &[]),
    ("UnstyledButton", &[]),
    ("VisuallyHidden", &[]),
];

impl CapabilityRegistry {
    pub fn builtin() -> Self {
        let react = Hook::ALL
            .iter()
            .fold(ModuleSpec::new(REACT), |spec, &hook| {
                spec.with(hook.export_name(), Capability::Hook(hook))
            })
            .with("createElement", Capability::CreateElement)
            .with("Fragment", Capability::Fragment);

        let mantine = MANTINE_COMPONENTS
            .iter()
            .fold(ModuleSpec::new(MANTINE), |spec, &(name, parts)| {
                spec.with(name, Capability::HostComponent { parts })
            });

        let mut modules = BTreeMap::new();
        modules.insert(REACT, react);
        modules.insert(MANTINE, mantine);
        Self { modules }
    }

    pub fn module(&self, specifier: &str) -> Option<&ModuleSpec> {
        self.modules.get(specifier)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleSpec> {
        self.modules.values()
    }

    pub fn specifiers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.modules.keys().copied()
    }

    /// JSON description of every module, read by the sandbox prelude to
    /// build the `__modules` table.
    pub fn manifest(&self) -> JsonValue {
        let modules: Map<String, JsonValue> = self
            .modules
            .values()
            .map(|spec| {
                let exports: Map<String, JsonValue> = spec
                    .exports()
                    .map(|(name, capability)| (name.to_string(), capability.manifest_entry()))
                    .collect();
                (spec.specifier().to_string(), JsonValue::Object(exports))
            })
            .collect();
        JsonValue::Object(modules)
    }

    /// Qualified kind of a host sub-component, e.g. `("Grid", "Col")` -> `Grid.Col`.
    pub fn host_part(&self, component: &str, part: &str) -> Option<String> {
        self.modules.values().find_map(|spec| match spec.get(component) {
            Some(Capability::HostComponent { parts }) if parts.contains(&part) => {
                Some(format!("{}.{}", component, part))
            }
            _ => None,
        })
    }

    /// Whether `kind` names a host component or one of its parts.
    pub fn is_host_kind(&self, kind: &str) -> bool {
        match kind.split_once('.') {
            Some((component, part)) => self.host_part(component, part).is_some(),
            None => self
                .modules
                .values()
                .any(|spec| matches!(spec.get(kind), Some(Capability::HostComponent { .. }))),
        }
    }
}

pub static REGISTRY: Lazy<CapabilityRegistry> = Lazy::new(CapabilityRegistry::builtin);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_modules() {
        assert_eq!(REGISTRY.specifiers().collect::<Vec<_>>(), vec![MANTINE, REACT]);
        let react = REGISTRY.module(REACT).unwrap();
        assert!(react.has_export("useState"));
        assert!(react.has_export("Fragment"));
        assert!(react.has_export("useReducer"));
        assert!(!react.has_export("useSyncExternalStore"));
        assert!(REGISTRY.module("lodash").is_none());
    }

    #[test]
    fn test_host_parts() {
        assert_eq!(REGISTRY.host_part("Grid", "Col").as_deref(), Some("Grid.Col"));
        assert_eq!(REGISTRY.host_part("Grid", "Row"), None);
        assert!(REGISTRY.is_host_kind("Table.Td"));
        assert!(REGISTRY.is_host_kind("TextInput"));
        assert!(!REGISTRY.is_host_kind("useState"));
        assert!(!REGISTRY.is_host_kind("div"));
    }

    #[test]
    fn test_mantine_v7_components() {
        let mantine = REGISTRY.module(MANTINE).unwrap();
        for name in ["Fieldset", "Blockquote", "Chip", "Slider", "Highlight", "Mark", "PasswordInput", "MultiSelect", "Rating"] {
            assert!(mantine.has_export(name), "missing {}", name);
        }
        assert!(REGISTRY.is_host_kind("Accordion.Item"));
        assert!(REGISTRY.is_host_kind("Timeline.Item"));
        assert!(REGISTRY.is_host_kind("Stepper.Step"));
        assert!(!mantine.has_export("DatePicker"));
    }

    #[test]
    fn test_manifest_shape() {
        let manifest = REGISTRY.manifest();
        assert_eq!(manifest[REACT]["useState"], json!({"kind": "hook", "hook": "useState"}));
        assert_eq!(manifest[REACT]["Fragment"], json!({"kind": "fragment"}));
        assert_eq!(manifest[MANTINE]["Grid"], json!({"kind": "host", "parts": ["Col"]}));
        assert_eq!(manifest[MANTINE]["Text"], json!({"kind": "host", "parts": []}));
    }
}

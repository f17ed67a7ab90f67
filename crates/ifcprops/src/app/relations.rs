//! Relation index backing the element relation tree.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::model::{ElementId, Relation};

/// Parent to children edges of a loaded model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationIndex {
    children: BTreeMap<ElementId, Vec<ElementId>>,
    parents: BTreeMap<ElementId, ElementId>,
}

impl RelationIndex {
    /// Index relations, keeping the first parent seen for each child and dropping duplicates.
    pub fn from_relations(relations: impl IntoIterator<Item = Relation>) -> Self {
        let mut index = Self::default();
        for Relation { parent, child } in relations {
            if parent == child || index.parents.contains_key(&child) {
                continue;
            }
            index.parents.insert(child, parent);
            index.children.entry(parent).or_default().push(child);
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.parents.get(&id).copied()
    }

    /// Elements that have children but no parent, in ascending id order.
    pub fn roots(&self) -> Vec<ElementId> {
        self.children
            .keys()
            .copied()
            .filter(|id| !self.parents.contains_key(id))
            .collect()
    }

    /// Render the forest as indented text with box-drawing connectors.
    ///
    /// Parents only reachable through a cycle are rendered as extra roots, smallest id first.
    pub fn render_tree(&self, label: impl Fn(ElementId) -> String) -> String {
        let mut lines = Vec::new();
        let mut visited = BTreeSet::new();
        for root in self.roots() {
            self.render_root(root, &label, &mut visited, &mut lines);
        }
        loop {
            let next = self.children.keys().copied().find(|id| !visited.contains(id));
            let Some(root) = next else { break };
            self.render_root(root, &label, &mut visited, &mut lines);
        }
        lines.join("\n")
    }

    fn render_root(
        &self,
        root: ElementId,
        label: &impl Fn(ElementId) -> String,
        visited: &mut BTreeSet<ElementId>,
        lines: &mut Vec<String>,
    ) {
        lines.push(label(root));
        visited.insert(root);
        self.render_children(root, "", label, visited, lines);
    }

    fn render_children(
        &self,
        id: ElementId,
        prefix: &str,
        label: &impl Fn(ElementId) -> String,
        visited: &mut BTreeSet<ElementId>,
        lines: &mut Vec<String>,
    ) {
        let children = self.children(id);
        for (position, child) in children.iter().enumerate() {
            let last = position + 1 == children.len();
            let connector = if last { "└── " } else { "├── " };
            lines.push(format!("{prefix}{connector}{}", label(*child)));

            // cycles only reachable through malformed relation data
            if !visited.insert(*child) {
                continue;
            }
            let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
            self.render_children(*child, &nested, label, visited, lines);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    fn rel(parent: u64, child: u64) -> Relation {
        Relation {
            parent: ElementId(parent),
            child: ElementId(child),
        }
    }

    #[test]
    fn indexes_children_and_roots() {
        let index = RelationIndex::from_relations([rel(1, 10), rel(1, 11), rel(10, 100)]);
        assert_eq!(index.roots(), vec![ElementId(1)]);
        assert_eq!(index.children(ElementId(1)), &[ElementId(10), ElementId(11)]);
        assert_eq!(index.parent(ElementId(100)), Some(ElementId(10)));
        assert!(index.children(ElementId(11)).is_empty());
    }

    #[test]
    fn ignores_self_links_and_second_parents() {
        let index = RelationIndex::from_relations([rel(1, 1), rel(1, 2), rel(3, 2)]);
        assert_eq!(index.parent(ElementId(2)), Some(ElementId(1)));
        assert_eq!(index.roots(), vec![ElementId(1)]);
    }

    #[test]
    fn cycle_without_roots_still_renders() {
        let index = RelationIndex::from_relations([rel(1, 2), rel(2, 1)]);
        assert!(index.roots().is_empty());
        assert_eq!(
            index.render_tree(|id| format!("#{id}")),
            "#1\n└── #2\n    └── #1"
        );
    }

    #[test]
    fn detached_cycle_is_rendered_after_rooted_trees() {
        let index = RelationIndex::from_relations([rel(1, 10), rel(5, 6), rel(6, 5)]);
        assert_eq!(
            index.render_tree(|id| format!("#{id}")),
            "#1\n└── #10\n#5\n└── #6\n    └── #5"
        );
    }

    #[test]
    fn renders_tree() {
        let index = RelationIndex::from_relations([
            rel(1, 10),
            rel(1, 20),
            rel(10, 100),
            rel(10, 101),
            rel(20, 200),
        ]);
        let rendered = index.render_tree(|id| format!("#{id}"));
        assert_snapshot!(rendered, @r"
        #1
        ├── #10
        │   ├── #100
        │   └── #101
        └── #20
            └── #200
        ");
    }
}

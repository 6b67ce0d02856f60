//! Grouping of flat record lists into company → order → product style trees
use super::record::Record;
use std::collections::HashMap;

/// One level of the tree: how to pull the key out of a record, and where
/// records without one go.
pub struct GroupLevel<'a, T> {
    pub name: String,
    pub fallback: String,
    extract: Box<dyn Fn(&T) -> Option<String> + 'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildOrder {
    /// Children appear in the order their key is first seen in the input.
    #[default]
    FirstSeen,
    /// Case-insensitive by key, exact key as tie-break, fallback groups last.
    Alphabetical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Children<T> {
    Groups(Vec<GroupNode<T>>),
    Records(Vec<T>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNode<T> {
    pub key: String,
    // true for the fallback bucket of records missing this level's key
    pub synthetic: bool,
    pub children: Children<T>,
}

pub struct HierarchyBuilder<'a, T> {
    levels: Vec<GroupLevel<'a, T>>,
    order: ChildOrder,
}

impl<'a, T> GroupLevel<'a, T> {
    pub fn new(
        name: &str,
        fallback: &str,
        extract: impl Fn(&T) -> Option<String> + 'a,
    ) -> Self {
        Self {
            name: name.to_owned(),
            fallback: fallback.to_owned(),
            extract: Box::new(extract),
        }
    }

    /// Blank keys count as missing.
    fn key_of(&self, record: &T) -> Option<String> {
        (self.extract)(record).filter(|k| !k.trim().is_empty())
    }
}

impl GroupLevel<'static, Record> {
    /// Groups on `record.group_keys[index]`.
    pub fn by_group_key(name: &str, index: usize, fallback: &str) -> Self {
        Self::new(name, fallback, move |r: &Record| {
            r.group_key(index).map(str::to_owned)
        })
    }
    /// Groups on the first value of a named field.
    pub fn by_field(name: &str, fallback: &str) -> Self {
        let field = name.to_owned();
        Self::new(name, fallback, move |r: &Record| r.field(&field).first().cloned())
    }
}

impl<'a, T: Clone> HierarchyBuilder<'a, T> {
    pub fn new(levels: Vec<GroupLevel<'a, T>>) -> Self {
        Self {
            levels,
            order: ChildOrder::default(),
        }
    }
    pub fn order(mut self, order: ChildOrder) -> Self {
        self.order = order;
        self
    }
    pub fn group(&self, records: &[T]) -> GroupNode<T> {
        let refs: Vec<&T> = records.iter().collect();
        GroupNode {
            key: String::new(),
            synthetic: false,
            children: self.build(&refs, 0),
        }
    }

    fn build(&self, records: &[&T], depth: usize) -> Children<T> {
        let Some(level) = self.levels.get(depth) else {
            return Children::Records(records.iter().map(|r| (*r).clone()).collect());
        };

        // bucket index by (key, synthetic) so a real key equal to the fallback
        // text stays a separate group
        let mut index: HashMap<(String, bool), usize> = HashMap::new();
        let mut buckets: Vec<(String, bool, Vec<&T>)> = vec![];
        for record in records {
            let (key, synthetic) = match level.key_of(record) {
                Some(k) => (k, false),
                None => (level.fallback.clone(), true),
            };
            let slot = *index.entry((key.clone(), synthetic)).or_insert_with(|| {
                buckets.push((key, synthetic, vec![]));
                buckets.len() - 1
            });
            buckets[slot].2.push(*record);
        }

        if self.order == ChildOrder::Alphabetical {
            buckets.sort_by(|a, b| {
                a.1.cmp(&b.1)
                    .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
                    .then_with(|| a.0.cmp(&b.0))
            });
        }

        Children::Groups(
            buckets
                .into_iter()
                .map(|(key, synthetic, members)| GroupNode {
                    key,
                    synthetic,
                    children: self.build(&members, depth + 1),
                })
                .collect(),
        )
    }
}

/// Groups with first-seen child order.
pub fn group<T: Clone>(records: &[T], levels: Vec<GroupLevel<'_, T>>) -> GroupNode<T> {
    HierarchyBuilder::new(levels).group(records)
}

impl<T> GroupNode<T> {
    pub fn is_leaf(&self) -> bool {
        matches!(self.children, Children::Records(_))
    }
    /// The child group for a real `key`; the fallback group never matches,
    /// even when a real key has the same text.
    pub fn child(&self, key: &str) -> Option<&GroupNode<T>> {
        self.find_child(|g| !g.synthetic && g.key == key)
    }
    /// The group of records that had no key at this level.
    pub fn fallback_child(&self) -> Option<&GroupNode<T>> {
        self.find_child(|g| g.synthetic)
    }
    /// Follows real keys down the tree.
    pub fn path(&self, keys: &[&str]) -> Option<&GroupNode<T>> {
        keys.iter().try_fold(self, |node, key| node.child(key))
    }
    pub fn child_keys(&self) -> Vec<&str> {
        match &self.children {
            Children::Groups(groups) => groups.iter().map(|g| g.key.as_str()).collect(),
            Children::Records(_) => vec![],
        }
    }
    /// Number of records beneath this node.
    pub fn len(&self) -> usize {
        match &self.children {
            Children::Groups(groups) => groups.iter().map(GroupNode::len).sum(),
            Children::Records(records) => records.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Every record beneath this node, in tree order.
    pub fn records(&self) -> Vec<&T> {
        let mut out = vec![];
        self.collect_records(&mut out);
        out
    }
    pub fn leaves(&self) -> Vec<&GroupNode<T>> {
        let mut out = vec![];
        self.collect_leaves(&mut out);
        out
    }

    fn find_child(&self, pred: impl Fn(&GroupNode<T>) -> bool) -> Option<&GroupNode<T>> {
        match &self.children {
            Children::Groups(groups) => groups.iter().find(|g| pred(g)),
            Children::Records(_) => None,
        }
    }
    fn collect_records<'n>(&'n self, out: &mut Vec<&'n T>) {
        match &self.children {
            Children::Groups(groups) => groups.iter().for_each(|g| g.collect_records(out)),
            Children::Records(records) => out.extend(records.iter()),
        }
    }
    fn collect_leaves<'n>(&'n self, out: &mut Vec<&'n GroupNode<T>>) {
        match &self.children {
            Children::Groups(groups) => groups.iter().for_each(|g| g.collect_leaves(out)),
            Children::Records(_) => out.push(self),
        }
    }
}

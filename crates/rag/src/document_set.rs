//! Id-keyed document dedup and merge

use std::collections::{BTreeMap, HashMap};

use qa_assistant_core::Document;

/// Output order of a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeOrder {
    /// Ascending by document id
    #[default]
    ById,
    /// Order of first appearance across the input lists
    Insertion,
}

/// Ordered, deduplicated collection of documents keyed by id.
///
/// Inserting a document whose id is already present replaces the stored
/// copy, so the last occurrence wins. In insertion order the replaced
/// document keeps the slot of the first occurrence.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    order: MergeOrder,
    slots: Vec<Document>,
    index: HashMap<u64, usize>,
}

impl DocumentSet {
    pub fn new(order: MergeOrder) -> Self {
        Self {
            order,
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Merge lists, ascending by id
    pub fn merge<I, L>(lists: I) -> Vec<Document>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = Document>,
    {
        Self::merge_with(lists, MergeOrder::ById)
    }

    /// Merge lists, keeping order of first appearance
    pub fn merge_in_insertion_order<I, L>(lists: I) -> Vec<Document>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = Document>,
    {
        Self::merge_with(lists, MergeOrder::Insertion)
    }

    pub fn merge_with<I, L>(lists: I, order: MergeOrder) -> Vec<Document>
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = Document>,
    {
        let mut set = Self::new(order);
        for list in lists {
            set.extend(list);
        }
        set.into_vec()
    }

    pub fn insert(&mut self, document: Document) {
        match self.index.get(&document.id) {
            Some(&slot) => self.slots[slot] = document,
            None => {
                self.index.insert(document.id, self.slots.len());
                self.slots.push(document);
            },
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn into_vec(self) -> Vec<Document> {
        match self.order {
            MergeOrder::Insertion => self.slots,
            MergeOrder::ById => self
                .slots
                .into_iter()
                .map(|doc| (doc.id, doc))
                .collect::<BTreeMap<_, _>>()
                .into_values()
                .collect(),
        }
    }
}

impl Extend<Document> for DocumentSet {
    fn extend<T: IntoIterator<Item = Document>>(&mut self, iter: T) {
        for doc in iter {
            self.insert(doc);
        }
    }
}

/// Keep documents whose relevance score is strictly above `threshold`,
/// preserving input order. Unscored documents are dropped.
pub fn filter_by_relevance(documents: Vec<Document>, threshold: f32) -> Vec<Document> {
    documents
        .into_iter()
        .filter(|doc| doc.is_relevant(threshold))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: u64, content: &str) -> Document {
        Document::new(id, content)
    }

    fn ids(docs: &[Document]) -> Vec<u64> {
        docs.iter().map(|d| d.id).collect()
    }

    #[test]
    fn test_merge_sorts_by_id() {
        let merged = DocumentSet::merge([vec![doc(7, "g"), doc(2, "b")], vec![doc(5, "e")]]);
        assert_eq!(ids(&merged), vec![2, 5, 7]);
    }

    #[test]
    fn test_later_occurrence_wins() {
        let direct = doc(3, "direct").with_relevance_score(0.9);
        let neighbor = doc(3, "neighbor").with_distance(0.1);
        let merged = DocumentSet::merge([vec![direct], vec![neighbor]]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "neighbor");
        assert_eq!(merged[0].distance, Some(0.1));
    }

    #[test]
    fn test_insertion_order_keeps_first_slot() {
        let merged = DocumentSet::merge_in_insertion_order([
            vec![doc(9, "a"), doc(1, "b"), doc(4, "c")],
            vec![doc(1, "b2")],
        ]);
        assert_eq!(ids(&merged), vec![9, 1, 4]);
        assert_eq!(merged[1].content, "b2");
    }

    #[test]
    fn test_empty_merge() {
        let merged = DocumentSet::merge(Vec::<Vec<Document>>::new());
        assert!(merged.is_empty());
    }

    #[test]
    fn test_filter_is_strict() {
        let docs = vec![
            doc(1, "a").with_relevance_score(0.5),
            doc(2, "b").with_relevance_score(0.51),
            doc(3, "c"),
        ];
        let kept = filter_by_relevance(docs, 0.5);
        assert_eq!(ids(&kept), vec![2]);
    }
}

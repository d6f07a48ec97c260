//! crates/reading_progress_core/src/hierarchy.rs
//!
//! Flattens a document's navigation tree into chapter records linked by parent ids.

use crate::domain::{Chapter, ChapterStatus, ChapterTree, NavPoint};
use uuid::Uuid;

/// Converts a navigation tree into a flat, depth-first ordered chapter collection.
///
/// Sibling order restarts at 1 under every parent. An empty tree yields an empty
/// collection; the caller treats that as a document without tracked structure.
pub fn extract_chapters(document_id: Uuid, nav: &[NavPoint]) -> ChapterTree {
    let mut chapters = Vec::new();
    collect_level(document_id, nav, None, &mut chapters);
    ChapterTree::new(chapters)
}

fn collect_level(
    document_id: Uuid,
    siblings: &[NavPoint],
    parent_id: Option<Uuid>,
    out: &mut Vec<Chapter>,
) {
    for (index, point) in siblings.iter().enumerate() {
        let chapter = Chapter {
            id: Uuid::new_v4(),
            document_id,
            parent_id,
            title: point.title.trim().to_string(),
            order: index as u32 + 1,
            href: point.content_path.clone().unwrap_or_default(),
            cfi: anchor_fragment(point.anchor.as_deref()),
            status: ChapterStatus::Active,
        };
        let id = chapter.id;
        out.push(chapter);
        collect_level(document_id, &point.children, Some(id), out);
    }
}

fn anchor_fragment(anchor: Option<&str>) -> Option<String> {
    anchor
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| format!("#{}", a.trim_start_matches('#')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nav(title: &str, children: Vec<NavPoint>) -> NavPoint {
        NavPoint {
            title: title.to_string(),
            content_path: Some(format!("{}.xhtml", title.to_lowercase())),
            anchor: None,
            children,
        }
    }

    #[test]
    fn order_restarts_for_every_sibling_group() {
        let tree = vec![
            nav("One", vec![nav("A", vec![]), nav("B", vec![]), nav("C", vec![])]),
            nav("Two", vec![nav("D", vec![]), nav("E", vec![]), nav("F", vec![])]),
        ];
        let chapters = extract_chapters(Uuid::new_v4(), &tree);
        assert_eq!(chapters.len(), 8);

        let root_orders: Vec<u32> = chapters.roots().map(|c| c.order).collect();
        assert_eq!(root_orders, vec![1, 2]);

        for root in chapters.roots() {
            let child_orders: Vec<u32> = chapters.children_of(root.id).map(|c| c.order).collect();
            assert_eq!(child_orders, vec![1, 2, 3]);
        }
    }

    #[test]
    fn traversal_is_depth_first() {
        let tree = vec![
            nav("One", vec![nav("A", vec![nav("Deep", vec![])])]),
            nav("Two", vec![]),
        ];
        let chapters = extract_chapters(Uuid::new_v4(), &tree);
        let titles: Vec<&str> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "A", "Deep", "Two"]);
    }

    #[test]
    fn parents_point_at_the_producing_node_and_share_the_document() {
        let document_id = Uuid::new_v4();
        let tree = vec![nav("One", vec![nav("A", vec![])])];
        let chapters = extract_chapters(document_id, &tree);
        let root = chapters.roots().next().unwrap();
        let child = chapters.children_of(root.id).next().unwrap();
        assert_eq!(child.parent_id, Some(root.id));
        assert!(chapters.iter().all(|c| c.document_id == document_id));
    }

    #[test]
    fn href_and_fragment_derivation() {
        let tree = vec![
            NavPoint {
                title: "Anchored".to_string(),
                content_path: Some("text/ch1.xhtml".to_string()),
                anchor: Some("sec-2".to_string()),
                children: vec![],
            },
            NavPoint {
                title: "Bare".to_string(),
                ..NavPoint::default()
            },
        ];
        let chapters = extract_chapters(Uuid::new_v4(), &tree);
        let all: Vec<_> = chapters.iter().collect();
        assert_eq!(all[0].href, "text/ch1.xhtml");
        assert_eq!(all[0].cfi.as_deref(), Some("#sec-2"));
        assert_eq!(all[1].href, "");
        assert_eq!(all[1].cfi, None);
    }

    #[test]
    fn empty_navigation_yields_empty_tree() {
        let chapters = extract_chapters(Uuid::new_v4(), &[]);
        assert!(chapters.is_empty());
    }
}

use outline::core::{Block, Document, EditorNode, NodeId, Outline, OutlineNode, TreeBuilder};
use outline::settings::SyncSettings;
use outline::{extract_outline, parse_outline_text, reconcile, serialize_outline};
use proptest::prelude::*;

fn build(entries: &[(u8, String)]) -> Outline {
    let mut builder = TreeBuilder::new(3);
    for (level, title) in entries {
        builder.push(OutlineNode::new(*level, title.clone()));
    }
    builder.finish()
}

fn arb_outline() -> impl Strategy<Value = Outline> {
    proptest::collection::vec((1u8..=4, "[ \t0-9A-Za-z.][ 0-9A-Za-z.]{0,10}"), 0..25)
        .prop_map(|entries| build(&entries))
}

fn reversed(nodes: &[OutlineNode]) -> Vec<OutlineNode> {
    nodes
        .iter()
        .rev()
        .map(|n| OutlineNode {
            children: reversed(&n.children),
            ..n.clone()
        })
        .collect()
}

fn relevel(node: &mut OutlineNode, level: u8) {
    node.level = level;
    for child in node.children.iter_mut() {
        relevel(child, level + 1);
    }
}

/// Detach the subtree rooted at `id` and append it as a new top-level chapter.
fn move_to_root(tree: &Outline, id: &NodeId) -> Outline {
    let Some(mut moved) = tree.find(id).cloned() else {
        return tree.clone();
    };
    let mut next = tree.delete_node(id);
    relevel(&mut moved, 1);
    next.nodes.push(moved);
    next
}

fn numbered_titles(tree: &Outline) -> Vec<String> {
    let numbered = tree.number_for_display();
    let mut flat = Vec::new();
    for n in &numbered {
        n.walk(&mut flat);
    }
    flat.iter().map(|n| n.numbered_title.clone()).collect()
}

/// Serialize `tree` and give every section a body naming its heading id.
fn document_with_bodies(tree: &Outline) -> Document {
    let mut doc = serialize_outline(tree);
    let mut current = None;
    for block in doc.blocks.iter_mut() {
        let replacement = match block {
            Block::Heading(h) => {
                current = h.id.clone();
                None
            }
            Block::Content(_) => current.as_ref().map(body),
        };
        if let Some(filled) = replacement {
            *block = filled;
        }
    }
    doc
}

fn assert_bodies_follow_headings(doc: &Document) -> Result<(), TestCaseError> {
    for pair in doc.blocks.windows(2) {
        if let Block::Heading(h) = &pair[0] {
            let id = h.id.clone().expect("reconciled headings carry ids");
            prop_assert_eq!(&pair[1], &body(&id));
        }
    }
    Ok(())
}

fn body(id: &NodeId) -> Block {
    Block::Content(EditorNode::paragraph_with_text(format!("body of {id}")))
}

proptest! {
    #[test]
    fn prop_parsed_outline_is_always_valid(
        lines in proptest::collection::vec("[0-9.]{0,6}[ \t]?[A-Za-z ]{0,8}", 0..20)
    ) {
        let parsed = parse_outline_text(&lines.join("\n"));
        prop_assert!(parsed.validate(&SyncSettings::default()).is_ok());
    }

    #[test]
    fn prop_numbering_depends_only_on_shape(tree in arb_outline()) {
        let rebuilt = build(
            &tree.walk().iter().map(|n| (n.level, n.title.clone())).collect::<Vec<_>>(),
        );
        prop_assert_eq!(numbered_titles(&tree), numbered_titles(&rebuilt));
    }

    #[test]
    fn prop_numbering_is_idempotent(tree in arb_outline()) {
        prop_assert_eq!(tree.number_for_display(), tree.number_for_display());
    }

    #[test]
    fn prop_serialize_then_extract_round_trips(tree in arb_outline()) {
        let extraction = extract_outline(&serialize_outline(&tree));
        prop_assert!(extraction.assigned_ids.is_empty());
        prop_assert_eq!(extraction.outline, tree);
    }

    #[test]
    fn prop_reorder_keeps_content_with_its_heading(tree in arb_outline()) {
        let doc = document_with_bodies(&tree);
        let reordered = Outline::new(reversed(&tree.nodes));
        let out = reconcile(&doc, &reordered);
        prop_assert_eq!(out.blocks.len(), doc.blocks.len());
        assert_bodies_follow_headings(&out)?;
    }

    #[test]
    fn prop_rename_and_move_keep_content_with_its_heading(
        tree in arb_outline(),
        pick in any::<prop::sample::Index>(),
    ) {
        let all = tree.walk();
        prop_assume!(!all.is_empty());
        let target = all[pick.index(all.len())].id.clone();
        let doc = document_with_bodies(&tree);

        let mut edited = move_to_root(&Outline::new(reversed(&tree.nodes)), &target);
        for node in tree.walk() {
            edited.set_title(&node.id, &format!("{} (revised)", node.title));
        }
        prop_assert!(edited.validate(&SyncSettings::default()).is_ok());
        prop_assert_eq!(edited.node_count(), tree.node_count());

        let out = reconcile(&doc, &edited);
        prop_assert_eq!(out.blocks.len(), doc.blocks.len());
        assert_bodies_follow_headings(&out)?;
        let last = edited.nodes.last().map(|n| n.id.clone());
        prop_assert_eq!(last, Some(target));
    }

    #[test]
    fn prop_delete_removes_whole_subtree(tree in arb_outline(), pick in any::<prop::sample::Index>()) {
        let all = tree.walk();
        prop_assume!(!all.is_empty());
        let target = all[pick.index(all.len())];
        let mut doomed = Vec::new();
        target.walk(&mut doomed);

        let next = tree.delete_node(&target.id);
        for node in &doomed {
            prop_assert!(!next.contains(&node.id));
        }
        prop_assert_eq!(next.node_count(), tree.node_count() - doomed.len());
        prop_assert!(next.validate(&SyncSettings::default()).is_ok());
    }
}

#[test]
fn generated_outline_feeds_a_document() {
    let tree = parse_outline_text("1. Intro\n1.1.1 Detail\n2. Methods\n");
    assert_eq!(tree.nodes[0].children[0].level, 2);
    let doc = serialize_outline(&tree);
    assert_eq!(doc.blocks.len(), 6);
}

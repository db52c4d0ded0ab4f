//! Outline domain library: keeps a chapter outline and a heading-annotated rich-text
//! document consistent in both directions.
//! The core is pure: every structural operation takes trees in and hands new trees back,
//! and prose is relocated by stable heading id rather than by position.

pub mod core {
    use crate::settings::SyncSettings;
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};
    use std::{collections::HashSet, fmt};
    use tracing::debug;
    use uuid::Uuid;

    /* ------------------------------- IDs ------------------------------- */

    /// Stable, opaque node identifier. Join key between outline nodes and document headings.
    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct NodeId(pub String);

    impl NodeId {
        pub fn new() -> Self {
            Self(format!("outline-{}", Uuid::new_v4().simple()))
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl From<&str> for NodeId {
        fn from(s: &str) -> Self {
            Self(s.to_string())
        }
    }

    impl From<String> for NodeId {
        fn from(s: String) -> Self {
            Self(s)
        }
    }

    impl fmt::Display for NodeId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /* ------------------------------ Outline ------------------------------ */

    /// One chapter or section of the document plan.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct OutlineNode {
        pub id: NodeId,
        /// Plain title, never carrying a numbering prefix.
        pub title: String,
        /// 1 for top-level chapters, parent level + 1 below that.
        pub level: u8,
        /// Child sections in document order.
        #[serde(default)]
        pub children: Vec<OutlineNode>,
    }

    impl OutlineNode {
        pub fn new(level: u8, title: impl Into<String>) -> Self {
            Self::with_id(NodeId::new(), level, title)
        }

        pub fn with_id(id: NodeId, level: u8, title: impl Into<String>) -> Self {
            Self {
                id,
                title: title.into(),
                level,
                children: vec![],
            }
        }

        /// Depth-first walk including self.
        pub fn walk<'a>(&'a self, out: &mut Vec<&'a OutlineNode>) {
            out.push(self);
            for child in &self.children {
                child.walk(out);
            }
        }
    }

    /// Aggregate root: the ordered top-level chapters. Serializes as a bare JSON array.
    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Outline {
        pub nodes: Vec<OutlineNode>,
    }

    impl Outline {
        pub fn new(nodes: Vec<OutlineNode>) -> Self {
            Self { nodes }
        }

        pub fn is_empty(&self) -> bool {
            self.nodes.is_empty()
        }

        /// Total number of nodes at every depth.
        pub fn node_count(&self) -> usize {
            self.walk().len()
        }

        /// Snapshot all nodes in depth-first document order.
        pub fn walk(&self) -> Vec<&OutlineNode> {
            let mut out = Vec::new();
            for node in &self.nodes {
                node.walk(&mut out);
            }
            out
        }

        pub fn find(&self, id: &NodeId) -> Option<&OutlineNode> {
            fn rec<'a>(nodes: &'a [OutlineNode], id: &NodeId) -> Option<&'a OutlineNode> {
                for node in nodes {
                    if &node.id == id {
                        return Some(node);
                    }
                    if let Some(hit) = rec(&node.children, id) {
                        return Some(hit);
                    }
                }
                None
            }
            rec(&self.nodes, id)
        }

        pub fn contains(&self, id: &NodeId) -> bool {
            self.find(id).is_some()
        }

        /// Build the id → entry lookup table for this tree.
        pub fn index(&self) -> OutlineIndex {
            let mut index = OutlineIndex::default();
            fn rec(idx: &mut OutlineIndex, nodes: &[OutlineNode], parent: Option<&NodeId>) {
                for node in nodes {
                    let position = idx.entries.len();
                    idx.entries.entry(node.id.clone()).or_insert(IndexEntry {
                        level: node.level,
                        parent: parent.cloned(),
                        position,
                    });
                    rec(idx, &node.children, Some(&node.id));
                }
            }
            rec(&mut index, &self.nodes, None);
            index
        }

        /// Check the structural invariants: levels follow nesting, no level exceeds
        /// `settings.max_level`, and ids are unique.
        pub fn validate(&self, settings: &SyncSettings) -> Result<(), DomainError> {
            fn rec(
                nodes: &[OutlineNode],
                expected: u8,
                max: u8,
                seen: &mut HashSet<NodeId>,
            ) -> Result<(), DomainError> {
                for node in nodes {
                    if node.level != expected {
                        return Err(DomainError::InvalidLevel {
                            id: node.id.clone(),
                            found: node.level,
                            expected,
                        });
                    }
                    if node.level > max {
                        return Err(DomainError::TooDeep {
                            id: node.id.clone(),
                            level: node.level,
                            max,
                        });
                    }
                    if !seen.insert(node.id.clone()) {
                        return Err(DomainError::DuplicateId(node.id.clone()));
                    }
                    rec(&node.children, expected.saturating_add(1), max, seen)?;
                }
                Ok(())
            }
            rec(&self.nodes, 1, settings.max_level(), &mut HashSet::new())
        }

        /// Rebuild the tree so it satisfies `validate`. Nesting depth wins over stored
        /// levels, subtrees past the maximum are hoisted, and repeated ids are replaced.
        pub fn normalized(&self, settings: &SyncSettings) -> Outline {
            fn rec(
                builder: &mut TreeBuilder,
                nodes: &[OutlineNode],
                depth: u8,
                seen: &mut HashSet<NodeId>,
            ) {
                for node in nodes {
                    let id = if seen.insert(node.id.clone()) {
                        node.id.clone()
                    } else {
                        let fresh = NodeId::new();
                        debug!(duplicate = %node.id, replacement = %fresh, "replacing repeated outline id");
                        seen.insert(fresh.clone());
                        fresh
                    };
                    builder.push(OutlineNode::with_id(id, depth, node.title.clone()));
                    rec(builder, &node.children, depth.saturating_add(1), seen);
                }
            }
            let mut builder = TreeBuilder::new(settings.max_level());
            rec(&mut builder, &self.nodes, 1, &mut HashSet::new());
            builder.finish()
        }

        /* ------------------------ Structural operations ------------------------ */

        /// Append a placeholder chapter (no parent) or subchapter (under `parent`).
        /// An unknown `parent` leaves the tree unchanged.
        pub fn add_node(&self, parent: Option<&NodeId>) -> Outline {
            self.add_node_with(parent, &SyncSettings::default())
        }

        pub fn add_node_with(&self, parent: Option<&NodeId>, settings: &SyncSettings) -> Outline {
            let mut next = self.clone();
            match next.insert_node(parent, settings) {
                Some(_) => next,
                None => self.clone(),
            }
        }

        /// In-place variant of `add_node_with`; returns the id of the new node.
        ///
        /// A parent already at `max_level` cannot take children: the new node lands
        /// right after it as a sibling instead.
        pub fn insert_node(
            &mut self,
            parent: Option<&NodeId>,
            settings: &SyncSettings,
        ) -> Option<NodeId> {
            let Some(parent) = parent else {
                let node = OutlineNode::new(1, settings.chapter_placeholder.clone());
                let id = node.id.clone();
                self.nodes.push(node);
                return Some(id);
            };

            fn rec(
                nodes: &mut Vec<OutlineNode>,
                parent: &NodeId,
                settings: &SyncSettings,
            ) -> Option<NodeId> {
                for pos in 0..nodes.len() {
                    if &nodes[pos].id == parent {
                        let level = nodes[pos].level;
                        if level < settings.max_level() {
                            let node = OutlineNode::new(
                                level + 1,
                                settings.subchapter_placeholder.clone(),
                            );
                            let id = node.id.clone();
                            nodes[pos].children.push(node);
                            return Some(id);
                        }
                        debug!(%parent, level, "parent at maximum depth; adding a sibling instead");
                        let node =
                            OutlineNode::new(level, settings.subchapter_placeholder.clone());
                        let id = node.id.clone();
                        nodes.insert(pos + 1, node);
                        return Some(id);
                    }
                    if let Some(id) = rec(&mut nodes[pos].children, parent, settings) {
                        return Some(id);
                    }
                }
                None
            }

            let id = rec(&mut self.nodes, parent, settings);
            if id.is_none() {
                debug!(%parent, "add requested under a node that no longer exists");
            }
            id
        }

        /// Replace a node's title verbatim. Unknown ids leave the tree unchanged.
        pub fn rename_node(&self, id: &NodeId, title: &str) -> Outline {
            let mut next = self.clone();
            if !next.set_title(id, title) {
                debug!(%id, "rename requested for a node that no longer exists");
            }
            next
        }

        /// In-place rename; returns whether the node was found.
        pub fn set_title(&mut self, id: &NodeId, title: &str) -> bool {
            fn rec(nodes: &mut [OutlineNode], id: &NodeId, title: &str) -> bool {
                for node in nodes {
                    if &node.id == id {
                        node.title = title.to_string();
                        return true;
                    }
                    if rec(&mut node.children, id, title) {
                        return true;
                    }
                }
                false
            }
            rec(&mut self.nodes, id, title)
        }

        /// Remove the node with `id` wherever it occurs, together with its subtree.
        pub fn delete_node(&self, id: &NodeId) -> Outline {
            let mut next = self.clone();
            if !next.remove(id) {
                debug!(%id, "delete requested for a node that no longer exists");
            }
            next
        }

        /// In-place delete; returns whether anything was removed.
        pub fn remove(&mut self, id: &NodeId) -> bool {
            fn rec(nodes: &mut Vec<OutlineNode>, id: &NodeId) -> bool {
                let before = nodes.len();
                nodes.retain(|n| &n.id != id);
                let mut removed = nodes.len() != before;
                for node in nodes.iter_mut() {
                    removed |= rec(&mut node.children, id);
                }
                removed
            }
            rec(&mut self.nodes, id)
        }

        /* ----------------------------- Numbering ----------------------------- */

        /// Derive dotted display labels (`1.`, `1.2.`, ...) from tree shape alone.
        pub fn number_for_display(&self) -> Vec<NumberedOutlineNode> {
            fn rec(nodes: &[OutlineNode], prefix: &str) -> Vec<NumberedOutlineNode> {
                nodes
                    .iter()
                    .enumerate()
                    .map(|(idx, node)| {
                        let number = format!("{}{}", prefix, idx + 1);
                        let children = rec(&node.children, &format!("{number}."));
                        NumberedOutlineNode {
                            id: node.id.clone(),
                            title: node.title.clone(),
                            level: node.level,
                            numbered_title: numbered_title(&number, &node.title),
                            number,
                            children,
                        }
                    })
                    .collect()
            }
            rec(&self.nodes, "")
        }
    }

    /// Display label for a node: `"2.1. Methods"`.
    pub fn numbered_title(number: &str, title: &str) -> String {
        format!("{number}. {title}")
    }

    /// Display-only view of an outline node. Regenerated on demand, never persisted.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct NumberedOutlineNode {
        pub id: NodeId,
        pub title: String,
        pub level: u8,
        /// Dotted sequence without the trailing dot, e.g. `2.1`.
        pub number: String,
        pub numbered_title: String,
        pub children: Vec<NumberedOutlineNode>,
    }

    impl NumberedOutlineNode {
        pub fn walk<'a>(&'a self, out: &mut Vec<&'a NumberedOutlineNode>) {
            out.push(self);
            for child in &self.children {
                child.walk(out);
            }
        }
    }

    /* -------------------------------- Index -------------------------------- */

    #[derive(Debug, Clone, PartialEq, Eq, Serialize)]
    pub struct IndexEntry {
        pub level: u8,
        pub parent: Option<NodeId>,
        /// Depth-first position in the tree.
        pub position: usize,
    }

    /// Flat id → entry table; first occurrence wins when ids repeat.
    #[derive(Debug, Clone, PartialEq, Eq, Default)]
    pub struct OutlineIndex {
        entries: IndexMap<NodeId, IndexEntry>,
    }

    impl OutlineIndex {
        pub fn get(&self, id: &NodeId) -> Option<&IndexEntry> {
            self.entries.get(id)
        }

        pub fn contains(&self, id: &NodeId) -> bool {
            self.entries.contains_key(id)
        }

        pub fn parent_of(&self, id: &NodeId) -> Option<&NodeId> {
            self.entries.get(id).and_then(|e| e.parent.as_ref())
        }

        /// Ids in depth-first order.
        pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
            self.entries.keys()
        }

        pub fn len(&self) -> usize {
            self.entries.len()
        }

        pub fn is_empty(&self) -> bool {
            self.entries.is_empty()
        }
    }

    /* ----------------------------- Tree builder ----------------------------- */

    /// Assembles childless nodes arriving in document order into a tree, stack-building
    /// by levels. Whatever level a node claims, it is placed so that
    /// `child.level == parent.level + 1` holds and no level exceeds the maximum:
    /// claims above the maximum are clamped, orphans attach to the nearest open
    /// ancestor, and orphans with no ancestor become roots.
    #[derive(Debug)]
    pub struct TreeBuilder {
        max_level: u8,
        stack: Vec<OutlineNode>,
        roots: Vec<OutlineNode>,
    }

    impl TreeBuilder {
        pub fn new(max_level: u8) -> Self {
            Self {
                max_level: max_level.max(1),
                stack: Vec::new(),
                roots: Vec::new(),
            }
        }

        /// Place `node` (its `children` are expected empty) and return the level it got.
        pub fn push(&mut self, mut node: OutlineNode) -> u8 {
            let claimed = node.level;
            let mut level = claimed.clamp(1, self.max_level);
            if level != claimed {
                debug!(id = %node.id, claimed, level, "clamping outline level");
            }

            while self.stack.last().is_some_and(|top| top.level >= level) {
                self.close_top();
            }

            match self.stack.last() {
                None if level != 1 => {
                    debug!(id = %node.id, level, "no open ancestor; treating as a root");
                    level = 1;
                }
                Some(top) if top.level + 1 != level => {
                    debug!(
                        id = %node.id,
                        claimed = level,
                        parent = %top.id,
                        "level skip; attaching to nearest ancestor"
                    );
                    level = top.level + 1;
                }
                _ => {}
            }

            node.level = level;
            self.stack.push(node);
            level
        }

        pub fn finish(mut self) -> Outline {
            while !self.stack.is_empty() {
                self.close_top();
            }
            Outline::new(self.roots)
        }

        fn close_top(&mut self) {
            if let Some(completed) = self.stack.pop() {
                match self.stack.last_mut() {
                    Some(parent) => parent.children.push(completed),
                    None => self.roots.push(completed),
                }
            }
        }
    }

    /* ---------------------------- Document Model ---------------------------- */

    /// Rich-text document body as a flat sequence of blocks in document order.
    /// Content blocks belong to the nearest heading above them.
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct Document {
        pub blocks: Vec<Block>,
    }

    impl Document {
        pub fn new(blocks: Vec<Block>) -> Self {
            Self { blocks }
        }

        pub fn headings(&self) -> impl Iterator<Item = &Heading> {
            self.blocks.iter().filter_map(|b| match b {
                Block::Heading(h) => Some(h),
                Block::Content(_) => None,
            })
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum Block {
        Heading(Heading),
        /// Anything that is not a heading (paragraphs, lists, quotes, citations, ...),
        /// kept verbatim.
        Content(EditorNode),
    }

    impl Block {
        /// The empty paragraph that makes a heading's position editable.
        pub fn placeholder() -> Self {
            Block::Content(EditorNode::paragraph())
        }
    }

    /// A heading element. `id` and `level` are outline metadata; `rank` is the visual
    /// heading rank and is capped independently of `level`.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Heading {
        pub rank: u8,
        pub text: String,
        pub id: Option<NodeId>,
        pub level: Option<u8>,
    }

    impl Heading {
        /// A heading typed directly in the editor, without outline metadata.
        pub fn plain(rank: u8, text: impl Into<String>) -> Self {
            Self {
                rank,
                text: text.into(),
                id: None,
                level: None,
            }
        }
    }

    /// Generic editor node in ProseMirror/TipTap JSON shape.
    #[serde_with::skip_serializing_none]
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct EditorNode {
        #[serde(rename = "type")]
        pub kind: String,
        pub attrs: Option<serde_json::Map<String, serde_json::Value>>,
        pub content: Option<Vec<EditorNode>>,
        pub text: Option<String>,
        pub marks: Option<Vec<serde_json::Value>>,
    }

    impl EditorNode {
        pub fn new(kind: impl Into<String>) -> Self {
            Self {
                kind: kind.into(),
                attrs: None,
                content: None,
                text: None,
                marks: None,
            }
        }

        pub fn text(text: impl Into<String>) -> Self {
            Self {
                text: Some(text.into()),
                ..Self::new("text")
            }
        }

        pub fn paragraph() -> Self {
            Self::new("paragraph")
        }

        pub fn paragraph_with_text(text: impl Into<String>) -> Self {
            Self {
                content: Some(vec![Self::text(text)]),
                ..Self::paragraph()
            }
        }

        /// Concatenated text of this node and its descendants.
        pub fn plain_text(&self) -> String {
            fn rec(node: &EditorNode, out: &mut String) {
                if let Some(t) = &node.text {
                    out.push_str(t);
                }
                for child in node.content.iter().flatten() {
                    rec(child, out);
                }
            }
            let mut s = String::new();
            rec(self, &mut s);
            s
        }
    }

    /* ---------------------------- Errors (domain) ---------------------------- */

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum DomainError {
        #[error("node {id} has level {found}, expected {expected}")]
        InvalidLevel { id: NodeId, found: u8, expected: u8 },
        #[error("node {id} at level {level} exceeds the maximum depth {max}")]
        TooDeep { id: NodeId, level: u8, max: u8 },
        #[error("duplicate node id {0}")]
        DuplicateId(NodeId),
    }

}

pub mod settings {
    //! Engine configuration. Every field has a default, so partial JSON files load.

    use anyhow::{Context, Result};
    use serde::{Deserialize, Serialize};
    use std::{fs, path::Path};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct SyncSettings {
        /// Deepest outline level accepted by every operation (parser, extractor, edits).
        pub max_level: u8,
        /// Visual heading rank = outline level + offset. Rank 1 stays free for a document title.
        pub heading_rank_offset: u8,
        /// Ceiling for visual heading ranks; deeper levels collapse onto it.
        pub max_heading_rank: u8,
        /// Title given to chapters added from the outline panel.
        pub chapter_placeholder: String,
        /// Title given to subchapters added from the outline panel.
        pub subchapter_placeholder: String,
    }

    impl Default for SyncSettings {
        fn default() -> Self {
            Self {
                max_level: 3,
                heading_rank_offset: 1,
                max_heading_rank: 4,
                chapter_placeholder: "New chapter".to_string(),
                subchapter_placeholder: "New subchapter".to_string(),
            }
        }
    }

    impl SyncSettings {
        pub fn from_json_str(text: &str) -> Result<Self> {
            serde_json::from_str(text).context("parsing sync settings")
        }

        pub fn load(path: &Path) -> Result<Self> {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
            Self::from_json_str(&text).with_context(|| format!("loading settings from {:?}", path))
        }

        pub fn max_level(&self) -> u8 {
            self.max_level.max(1)
        }

        pub fn heading_rank(&self, level: u8) -> u8 {
            level
                .saturating_add(self.heading_rank_offset)
                .min(self.max_heading_rank)
                .max(1)
        }

        /// Outline level implied by a bare visual rank, or `None` for title headings.
        pub fn level_from_rank(&self, rank: u8) -> Option<u8> {
            rank.checked_sub(self.heading_rank_offset)
                .filter(|level| *level >= 1)
        }
    }

}

pub mod parser {
    //! Best-effort parser for numbered outline text produced by an AI completion.
    //!
    //! Each line is `<dotted number> <title>`; the number of dot-separated segments is
    //! the claimed depth. Lines without a numeric prefix are skipped. Placement goes
    //! through `TreeBuilder`, so malformed numbering still yields a valid tree.

    use crate::core::{Outline, OutlineNode, TreeBuilder};
    use crate::settings::SyncSettings;
    use nom::{
        IResult,
        bytes::complete::take_while1,
        combinator::{map, rest},
        error::VerboseError,
        sequence::tuple,
    };
    use tracing::{debug, warn};

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    /* ------------------------ Public entry points ------------------------ */

    pub fn parse_outline_text(input: &str) -> Outline {
        parse_outline_text_with(input, &SyncSettings::default())
    }

    pub fn parse_outline_text_with(input: &str, settings: &SyncSettings) -> Outline {
        let mut builder = TreeBuilder::new(settings.max_level());
        let mut skipped = 0usize;

        for (idx, raw) in input.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            match split_numbered(line) {
                Some((depth, title)) => {
                    let claimed = u8::try_from(depth).unwrap_or(u8::MAX);
                    builder.push(OutlineNode::new(claimed, title.trim()));
                }
                None => {
                    skipped += 1;
                    warn!(line = idx + 1, text = line, "skipping outline line without a numeric prefix");
                }
            }
        }

        let outline = builder.finish();
        debug!(nodes = outline.node_count(), skipped, "parsed generated outline");
        outline
    }

    /// Split `"1.2. Title"` into `(2, "Title")`. `None` when there is no dotted prefix
    /// followed by whitespace, or the prefix has no numeric segment.
    pub fn split_numbered(line: &str) -> Option<(usize, &str)> {
        let (_, (prefix, title)) = numbered_line(line).ok()?;
        let depth = prefix.split('.').filter(|seg| !seg.is_empty()).count();
        (depth > 0).then_some((depth, title))
    }

    fn numbered_line(i: &str) -> PResult<'_, (&str, &str)> {
        map(
            tuple((
                take_while1(|c: char| c.is_ascii_digit() || c == '.'),
                take_while1(char::is_whitespace),
                rest,
            )),
            |(prefix, _, title)| (prefix, title),
        )(i)
    }

}

pub mod format {
    //! Outline → document materialization, plus a plain-text preview.

    use crate::core::*;
    use crate::settings::SyncSettings;

    /// Materialize a fresh document: one heading per node followed by one empty
    /// placeholder. Only for documents without prior content.
    pub fn serialize_outline(outline: &Outline) -> Document {
        serialize_outline_with(outline, &SyncSettings::default())
    }

    pub fn serialize_outline_with(outline: &Outline, settings: &SyncSettings) -> Document {
        let mut blocks = Vec::new();
        emit_outline(outline, settings, &mut blocks, |_| vec![Block::placeholder()]);
        Document::new(blocks)
    }

    /// Emit every node depth-first as a heading followed by the blocks `body` returns
    /// for its id.
    pub(crate) fn emit_outline<F>(
        outline: &Outline,
        settings: &SyncSettings,
        out: &mut Vec<Block>,
        mut body: F,
    ) where
        F: FnMut(&NodeId) -> Vec<Block>,
    {
        let numbered = outline.number_for_display();
        let mut flat = Vec::new();
        for node in &numbered {
            node.walk(&mut flat);
        }
        for node in flat {
            out.push(Block::Heading(heading_for(node, settings)));
            out.extend(body(&node.id));
        }
    }

    pub fn heading_for(node: &NumberedOutlineNode, settings: &SyncSettings) -> Heading {
        Heading {
            rank: settings.heading_rank(node.level),
            text: node.numbered_title.clone(),
            id: Some(node.id.clone()),
            level: Some(node.level),
        }
    }

    /// Markdown-flavored preview: `#` per heading rank, one line per content block.
    pub fn render_plain(document: &Document) -> String {
        let mut out = String::new();
        for block in &document.blocks {
            match block {
                Block::Heading(h) => {
                    if !out.is_empty() && !out.ends_with("\n\n") {
                        out.push('\n');
                    }
                    out.push_str(&"#".repeat(h.rank.max(1) as usize));
                    out.push(' ');
                    out.push_str(&h.text);
                    out.push('\n');
                }
                Block::Content(node) => {
                    let text = node.plain_text();
                    if !text.is_empty() {
                        out.push_str(&text);
                        out.push('\n');
                    }
                }
            }
        }
        out
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn outline() -> Outline {
            let mut intro = OutlineNode::with_id("a".into(), 1, "Intro");
            let mut sub = OutlineNode::with_id("a1".into(), 2, "Scope");
            sub.children.push(OutlineNode::with_id("a11".into(), 3, "Limits"));
            intro.children.push(sub);
            Outline::new(vec![intro, OutlineNode::with_id("b".into(), 1, "Methods")])
        }

        #[test]
        fn emits_heading_then_placeholder_per_node() {
            let doc = serialize_outline(&outline());
            assert_eq!(doc.blocks.len(), 8);
            match &doc.blocks[0] {
                Block::Heading(h) => {
                    assert_eq!(h.text, "1. Intro");
                    assert_eq!(h.rank, 2);
                    assert_eq!(h.id, Some(NodeId::from("a")));
                    assert_eq!(h.level, Some(1));
                }
                other => panic!("expected heading, got {:?}", other),
            }
            assert_eq!(doc.blocks[1], Block::placeholder());
            match &doc.blocks[4] {
                Block::Heading(h) => {
                    assert_eq!(h.text, "1.1.1. Limits");
                    assert_eq!(h.rank, 4);
                }
                other => panic!("expected heading, got {:?}", other),
            }
        }

        #[test]
        fn rank_ceiling_applies() {
            let settings = SyncSettings {
                max_heading_rank: 3,
                ..SyncSettings::default()
            };
            let doc = serialize_outline_with(&outline(), &settings);
            let ranks: Vec<_> = doc.headings().map(|h| h.rank).collect();
            assert_eq!(ranks, vec![2, 3, 3, 2]);
        }

        #[test]
        fn empty_outline_gives_empty_document() {
            assert!(serialize_outline(&Outline::default()).blocks.is_empty());
        }

        #[test]
        fn plain_preview() {
            let mut doc = serialize_outline(&Outline::new(vec![OutlineNode::with_id(
                "a".into(),
                1,
                "Intro",
            )]));
            doc.blocks[1] = Block::Content(EditorNode::paragraph_with_text("Hello world"));
            assert_eq!(render_plain(&doc), "## 1. Intro\nHello world\n");
        }
    }
}

pub mod reconcile {
    //! Content-preserving reconciliation of a document against a changed outline.
    //!
    //! Pass 1 harvests the blocks following each id-carrying heading into a map keyed
    //! by id. Pass 2 re-emits the new outline depth-first and re-attaches each harvested
    //! run verbatim under the heading with the same id, wherever it moved. The result
    //! replaces the whole document body.
    //!
    //! Blocks before the first id-carrying heading form the preamble and are kept on top.
    //! Content under an id-less heading further down is not associated with any node and
    //! is dropped; run the extractor first to stamp ids on such headings.

    use crate::core::*;
    use crate::format::emit_outline;
    use crate::settings::SyncSettings;
    use indexmap::IndexMap;
    use serde::Serialize;
    use tracing::{debug, warn};

    #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
    pub struct ReconcileReport {
        /// Headings emitted for the new outline.
        pub headings: usize,
        /// Nodes whose previous content was carried over.
        pub preserved_sections: usize,
        /// Nodes that received an empty placeholder.
        pub placeholders: usize,
        /// Content blocks that had no surviving owner.
        pub discarded_blocks: usize,
        /// Ids present in the previous document but no longer in the outline.
        pub dropped_ids: Vec<NodeId>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Reconciliation {
        pub document: Document,
        pub report: ReconcileReport,
    }

    pub fn reconcile(previous: &Document, outline: &Outline) -> Document {
        reconcile_with_settings(previous, outline, &SyncSettings::default()).document
    }

    pub fn reconcile_with_settings(
        previous: &Document,
        outline: &Outline,
        settings: &SyncSettings,
    ) -> Reconciliation {
        let Harvest {
            preamble,
            mut sections,
            unassociated,
        } = harvest(previous);

        let mut report = ReconcileReport {
            discarded_blocks: unassociated,
            ..ReconcileReport::default()
        };
        let mut blocks = preamble;

        emit_outline(outline, settings, &mut blocks, |id| {
            report.headings += 1;
            match sections.shift_remove(id) {
                Some(content) if !content.is_empty() => {
                    report.preserved_sections += 1;
                    content
                }
                _ => {
                    report.placeholders += 1;
                    vec![Block::placeholder()]
                }
            }
        });

        for (id, content) in sections {
            debug!(%id, blocks = content.len(), "discarding content of deleted outline node");
            report.discarded_blocks += content.len();
            report.dropped_ids.push(id);
        }

        debug!(
            headings = report.headings,
            preserved = report.preserved_sections,
            discarded = report.discarded_blocks,
            "reconciled document"
        );

        Reconciliation {
            document: Document::new(blocks),
            report,
        }
    }

    /* ------------------------------- Pass 1 ------------------------------- */

    struct Harvest {
        preamble: Vec<Block>,
        sections: IndexMap<NodeId, Vec<Block>>,
        unassociated: usize,
    }

    enum Owner {
        Preamble,
        Section(NodeId),
        Unassociated,
    }

    fn harvest(document: &Document) -> Harvest {
        let mut preamble = Vec::new();
        let mut sections: IndexMap<NodeId, Vec<Block>> = IndexMap::new();
        let mut unassociated = 0usize;
        let mut owner = Owner::Preamble;

        for block in &document.blocks {
            match block {
                Block::Heading(Heading { id: Some(id), .. }) => {
                    if sections.contains_key(id) {
                        warn!(%id, "heading id repeated in document; keeping first section only");
                        owner = Owner::Unassociated;
                    } else {
                        sections.insert(id.clone(), Vec::new());
                        owner = Owner::Section(id.clone());
                    }
                }
                Block::Heading(heading) => {
                    if matches!(owner, Owner::Preamble) {
                        preamble.push(block.clone());
                    } else {
                        debug!(text = %heading.text, "heading without id; its content is not associated");
                        owner = Owner::Unassociated;
                    }
                }
                Block::Content(_) => match &owner {
                    Owner::Preamble => preamble.push(block.clone()),
                    Owner::Section(id) => {
                        if let Some(buf) = sections.get_mut(id) {
                            buf.push(block.clone());
                        }
                    }
                    Owner::Unassociated => unassociated += 1,
                },
            }
        }

        Harvest {
            preamble,
            sections,
            unassociated,
        }
    }

}

pub mod extract {
    //! Document → outline extraction, for structural edits made inside the editor.

    use crate::core::*;
    use crate::settings::SyncSettings;
    use nom::{
        IResult,
        bytes::complete::take_while1,
        character::complete::satisfy,
        combinator::verify,
        error::VerboseError,
        sequence::terminated,
    };
    use std::collections::HashSet;
    use tracing::{debug, warn};

    type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Extraction {
        pub outline: Outline,
        /// Copy of the input where every outline heading carries its resolved id and
        /// level. Load it back into the editor so typed headings keep their ids.
        pub document: Document,
        /// Ids synthesized for headings that had none (or repeated another's).
        pub assigned_ids: Vec<NodeId>,
    }

    pub fn extract_outline(document: &Document) -> Extraction {
        extract_outline_with(document, &SyncSettings::default())
    }

    pub fn extract_outline_with(document: &Document, settings: &SyncSettings) -> Extraction {
        let mut builder = TreeBuilder::new(settings.max_level());
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut assigned_ids = Vec::new();
        let mut stamped = Vec::with_capacity(document.blocks.len());

        for block in &document.blocks {
            let Block::Heading(heading) = block else {
                stamped.push(block.clone());
                continue;
            };

            let claimed = heading
                .level
                .filter(|level| *level >= 1)
                .or_else(|| settings.level_from_rank(heading.rank));
            let Some(claimed) = claimed else {
                debug!(text = %heading.text, "heading carries no outline level; skipping");
                stamped.push(block.clone());
                continue;
            };

            let id = match &heading.id {
                Some(id) if seen.insert(id.clone()) => id.clone(),
                other => {
                    if let Some(dup) = other {
                        warn!(id = %dup, "heading id repeated in document; assigning a fresh one");
                    }
                    let fresh = NodeId::new();
                    seen.insert(fresh.clone());
                    assigned_ids.push(fresh.clone());
                    fresh
                }
            };

            let title = strip_numbering(&heading.text);
            let level = builder.push(OutlineNode::with_id(id.clone(), claimed, title));
            stamped.push(Block::Heading(Heading {
                id: Some(id),
                level: Some(level),
                ..heading.clone()
            }));
        }

        let outline = builder.finish();
        debug!(
            nodes = outline.node_count(),
            assigned = assigned_ids.len(),
            "extracted outline from document"
        );
        Extraction {
            outline,
            document: Document::new(stamped),
            assigned_ids,
        }
    }

    /// Drop one leading display number (`"2.1. "`) from heading text. Only the single
    /// separator after the number goes; the rest of the title is kept verbatim.
    pub fn strip_numbering(text: &str) -> &str {
        if let Ok((title, _)) = display_prefix(text) {
            return title;
        }
        // An empty title whose trailing separator was trimmed away by the editor.
        let bare = text.trim_end();
        let only_number = bare.ends_with('.')
            && bare.chars().all(|c| c.is_ascii_digit() || c == '.')
            && bare.chars().any(|c| c.is_ascii_digit());
        if only_number { "" } else { text }
    }

    fn display_prefix(i: &str) -> PResult<'_, &str> {
        terminated(
            verify(
                take_while1(|c: char| c.is_ascii_digit() || c == '.'),
                |prefix: &str| prefix.chars().any(|c| c.is_ascii_digit()),
            ),
            satisfy(char::is_whitespace),
        )(i)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::format::serialize_outline;

        fn para(text: &str) -> Block {
            Block::Content(EditorNode::paragraph_with_text(text))
        }

        #[test]
        fn strips_display_numbers_once() {
            assert_eq!(strip_numbering("1. Intro"), "Intro");
            assert_eq!(strip_numbering("2.1. 3 Methods"), "3 Methods");
            assert_eq!(strip_numbering("Intro"), "Intro");
            assert_eq!(strip_numbering("1."), "");
            assert_eq!(strip_numbering("1. "), "");
            assert_eq!(strip_numbering("1.2."), "");
        }

        #[test]
        fn strip_keeps_title_whitespace_and_bare_numbers() {
            assert_eq!(strip_numbering("1.  Intro"), " Intro");
            assert_eq!(strip_numbering("2.\t\tTabbed"), "\tTabbed");
            assert_eq!(strip_numbering("2024"), "2024");
            assert_eq!(strip_numbering("1. 2024"), "2024");
            assert_eq!(strip_numbering("3. 1. Nested"), "1. Nested");
        }

        #[test]
        fn padded_and_numeric_titles_round_trip() {
            let t = Outline::new(vec![
                OutlineNode::with_id("a".into(), 1, "  Intro"),
                OutlineNode::with_id("b".into(), 1, "2024"),
                OutlineNode::with_id("c".into(), 1, " "),
            ]);
            assert_eq!(extract_outline(&serialize_outline(&t)).outline, t);
        }

        #[test]
        fn typed_numeric_heading_keeps_its_text() {
            let doc = Document::new(vec![Block::Heading(Heading::plain(2, "2024"))]);
            let extraction = extract_outline(&doc);
            assert_eq!(extraction.outline.nodes[0].title, "2024");
        }

        #[test]
        fn round_trips_serialized_outline() {
            let mut a = OutlineNode::with_id("a".into(), 1, "Intro");
            a.children.push(OutlineNode::with_id("a1".into(), 2, "Scope"));
            let t = Outline::new(vec![a, OutlineNode::with_id("b".into(), 1, "")]);
            let extraction = extract_outline(&serialize_outline(&t));
            assert_eq!(extraction.outline, t);
            assert!(extraction.assigned_ids.is_empty());
        }

        #[test]
        fn typed_headings_get_ids_and_rank_levels() {
            let doc = Document::new(vec![
                Block::Heading(Heading::plain(1, "Thesis Title")),
                Block::Heading(Heading::plain(2, "1. Intro")),
                para("x"),
                Block::Heading(Heading::plain(3, "Background")),
                Block::Heading(Heading::plain(2, "Results")),
            ]);
            let extraction = extract_outline(&doc);
            let outline = &extraction.outline;
            assert_eq!(outline.nodes.len(), 2);
            assert_eq!(outline.nodes[0].title, "Intro");
            assert_eq!(outline.nodes[0].children[0].title, "Background");
            assert_eq!(outline.nodes[0].children[0].level, 2);
            assert_eq!(extraction.assigned_ids.len(), 3);

            // Title heading untouched, the others stamped.
            assert_eq!(extraction.document.blocks[0], doc.blocks[0]);
            let stamped: Vec<_> = extraction
                .document
                .headings()
                .filter_map(|h| h.id.clone())
                .collect();
            assert_eq!(stamped, extraction.assigned_ids);
        }

        #[test]
        fn demoted_heading_is_reparented() {
            let doc = Document::new(vec![Block::Heading(Heading {
                rank: 4,
                text: "1. Was top level".into(),
                id: Some("a".into()),
                level: None,
            })]);
            let extraction = extract_outline(&doc);
            assert_eq!(extraction.outline.nodes[0].level, 1);
            match &extraction.document.blocks[0] {
                Block::Heading(h) => assert_eq!(h.level, Some(1)),
                other => panic!("expected heading, got {:?}", other),
            }
        }

        #[test]
        fn duplicate_ids_are_split() {
            let h = |text: &str| {
                Block::Heading(Heading {
                    rank: 2,
                    text: text.into(),
                    id: Some("same".into()),
                    level: Some(1),
                })
            };
            let extraction = extract_outline(&Document::new(vec![h("1. One"), h("2. Two")]));
            assert_eq!(extraction.outline.nodes.len(), 2);
            assert_eq!(extraction.outline.nodes[0].id, NodeId::from("same"));
            assert_ne!(extraction.outline.nodes[1].id, NodeId::from("same"));
            assert_eq!(extraction.assigned_ids.len(), 1);
        }

        #[test]
        fn stamping_closes_the_idless_content_gap() {
            let doc = Document::new(vec![
                Block::Heading(Heading::plain(2, "Typed")),
                para("keep me"),
            ]);
            let extraction = extract_outline(&doc);
            let renamed = extraction
                .outline
                .rename_node(&extraction.outline.nodes[0].id, "Renamed");
            let out = crate::reconcile::reconcile(&extraction.document, &renamed);
            assert_eq!(out.blocks[1], para("keep me"));
        }
    }
}

pub mod editor {
    //! Editor-framework boundary: ProseMirror/TipTap-style JSON ↔ `Document`.
    //!
    //! Headings carry `attrs.level` (visual rank), `attrs.id` and `attrs.outlineLevel`.
    //! Every other top-level node passes through untouched.

    use crate::core::*;
    use serde_json::{Map, Value};

    pub const NODE_DOC: &str = "doc";
    pub const NODE_HEADING: &str = "heading";
    pub const ATTR_RANK: &str = "level";
    pub const ATTR_ID: &str = "id";
    pub const ATTR_OUTLINE_LEVEL: &str = "outlineLevel";

    #[derive(Debug, thiserror::Error)]
    pub enum EditorError {
        #[error("invalid editor JSON: {0}")]
        Json(#[from] serde_json::Error),
        #[error("expected a `doc` root node, found `{0}`")]
        NotADocument(String),
    }

    pub fn document_from_json(text: &str) -> Result<Document, EditorError> {
        let root: EditorNode = serde_json::from_str(text)?;
        document_from_node(root)
    }

    pub fn document_to_json(document: &Document) -> Result<String, EditorError> {
        Ok(serde_json::to_string_pretty(&document_to_node(document))?)
    }

    pub fn document_from_node(root: EditorNode) -> Result<Document, EditorError> {
        if root.kind != NODE_DOC {
            return Err(EditorError::NotADocument(root.kind));
        }
        let blocks = root
            .content
            .unwrap_or_default()
            .into_iter()
            .map(|node| {
                if node.kind == NODE_HEADING {
                    Block::Heading(heading_from_node(&node))
                } else {
                    Block::Content(node)
                }
            })
            .collect();
        Ok(Document::new(blocks))
    }

    pub fn document_to_node(document: &Document) -> EditorNode {
        let content = document
            .blocks
            .iter()
            .map(|block| match block {
                Block::Heading(h) => heading_to_node(h),
                Block::Content(node) => node.clone(),
            })
            .collect();
        EditorNode {
            content: Some(content),
            ..EditorNode::new(NODE_DOC)
        }
    }

    fn heading_from_node(node: &EditorNode) -> Heading {
        let attrs = node.attrs.as_ref();
        let attr = |key: &str| attrs.and_then(|a| a.get(key));
        Heading {
            rank: attr(ATTR_RANK)
                .and_then(as_small_int)
                .map(|r| r.clamp(1, 6))
                .unwrap_or(1),
            text: node.plain_text(),
            id: attr(ATTR_ID).and_then(as_id),
            level: attr(ATTR_OUTLINE_LEVEL)
                .and_then(as_small_int)
                .filter(|l| *l >= 1),
        }
    }

    fn heading_to_node(heading: &Heading) -> EditorNode {
        let mut attrs = Map::new();
        attrs.insert(ATTR_RANK.into(), Value::from(heading.rank));
        if let Some(id) = &heading.id {
            attrs.insert(ATTR_ID.into(), Value::from(id.as_str()));
        }
        if let Some(level) = heading.level {
            attrs.insert(ATTR_OUTLINE_LEVEL.into(), Value::from(level));
        }
        let content = if heading.text.is_empty() {
            None
        } else {
            Some(vec![EditorNode::text(heading.text.clone())])
        };
        EditorNode {
            attrs: Some(attrs),
            content,
            ..EditorNode::new(NODE_HEADING)
        }
    }

    fn as_small_int(value: &Value) -> Option<u8> {
        match value {
            Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_id(value: &Value) -> Option<NodeId> {
        match value {
            Value::String(s) if !s.is_empty() => Some(NodeId(s.clone())),
            Value::Number(n) => Some(NodeId(n.to_string())),
            _ => None,
        }
    }

}

pub mod session {
    //! AI boundary. The conversation identifier lives in an explicit `SessionContext`
    //! owned by the caller, scoped to one conversation.

    use crate::core::Outline;
    use crate::parser::parse_outline_text_with;
    use crate::settings::SyncSettings;
    use anyhow::{Context, Result};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use tracing::{debug, warn};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SessionContext {
        /// Backend-assigned conversation id; `None` until the first reply.
        pub session_id: Option<String>,
        pub started_at: DateTime<Utc>,
        /// Completed prompt/reply exchanges.
        pub exchanges: u32,
    }

    impl SessionContext {
        pub fn new() -> Self {
            Self {
                session_id: None,
                started_at: Utc::now(),
                exchanges: 0,
            }
        }

        pub fn record(&mut self, completion: &Completion) {
            if let Some(id) = &completion.session_id {
                if self.session_id.as_ref() != Some(id) {
                    debug!(session_id = %id, "session id updated by backend");
                }
                self.session_id = Some(id.clone());
            }
            self.exchanges += 1;
        }
    }

    impl Default for SessionContext {
        fn default() -> Self {
            Self::new()
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Completion {
        pub text: String,
        pub session_id: Option<String>,
    }

    /// Opaque "send prompt, receive text" service.
    pub trait CompletionService {
        fn complete(&self, session: &SessionContext, prompt: &str) -> Result<Completion>;
    }

    /// Ask the service for an outline and parse the reply.
    pub fn generate_outline<S>(
        service: &S,
        session: &mut SessionContext,
        prompt: &str,
        settings: &SyncSettings,
    ) -> Result<Outline>
    where
        S: CompletionService + ?Sized,
    {
        let completion = service
            .complete(session, prompt)
            .context("requesting outline completion")?;
        session.record(&completion);
        let outline = parse_outline_text_with(&completion.text, settings);
        if outline.is_empty() {
            warn!("completion contained no numbered outline lines");
        }
        Ok(outline)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::cell::RefCell;

        struct Scripted {
            reply: &'static str,
            seen_sessions: RefCell<Vec<Option<String>>>,
        }

        impl CompletionService for Scripted {
            fn complete(&self, session: &SessionContext, _prompt: &str) -> Result<Completion> {
                self.seen_sessions.borrow_mut().push(session.session_id.clone());
                Ok(Completion {
                    text: self.reply.to_string(),
                    session_id: Some("s-1".into()),
                })
            }
        }

        struct Failing;

        impl CompletionService for Failing {
            fn complete(&self, _: &SessionContext, _: &str) -> Result<Completion> {
                anyhow::bail!("backend unavailable")
            }
        }

        #[test]
        fn session_id_is_carried_between_calls() {
            let service = Scripted {
                reply: "1. Intro\n1.1 Aim\n2. End",
                seen_sessions: RefCell::new(vec![]),
            };
            let mut session = SessionContext::new();
            let settings = SyncSettings::default();
            let outline =
                generate_outline(&service, &mut session, "outline please", &settings).expect("ok");
            assert_eq!(outline.node_count(), 3);
            generate_outline(&service, &mut session, "again", &settings).expect("ok");
            assert_eq!(
                *service.seen_sessions.borrow(),
                vec![None, Some("s-1".to_string())]
            );
            assert_eq!(session.exchanges, 2);
        }

        #[test]
        fn service_failure_propagates_and_leaves_session_alone() {
            let mut session = SessionContext::new();
            let err = generate_outline(&Failing, &mut session, "x", &SyncSettings::default())
                .unwrap_err();
            assert!(format!("{err:#}").contains("backend unavailable"));
            assert_eq!(session.exchanges, 0);
        }
    }
}

pub mod sync {
    //! Single-threaded coordinator for the two editing surfaces.
    //!
    //! Outline-panel edits and editor changes alternate and never overlap. A rewrite
    //! pushed into the editor is remembered, so its echo through the editor's change
    //! detection is not mistaken for a user edit.

    use crate::core::{Document, NodeId, Outline};
    use crate::extract::{Extraction, extract_outline_with};
    use crate::format::serialize_outline_with;
    use crate::reconcile::{ReconcileReport, Reconciliation, reconcile_with_settings};
    use crate::settings::SyncSettings;
    use tracing::debug;

    #[derive(Debug, Clone, PartialEq)]
    pub enum OutlineEdit {
        Add { parent: Option<NodeId> },
        Rename { id: NodeId, title: String },
        Delete { id: NodeId },
        /// Wholesale replacement, e.g. a freshly generated outline.
        Replace(Outline),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ChangeOutcome {
        /// The change was our own rewrite coming back; nothing to do.
        Echo,
        /// Structure is unchanged (prose edit).
        Unchanged,
        /// The outline was re-derived from the document. When `restamped` is set, ids
        /// were assigned to typed headings and `document()` must be loaded into the editor.
        OutlineChanged { restamped: bool },
    }

    #[derive(Debug, Clone)]
    pub struct OutlineSync {
        outline: Outline,
        document: Document,
        settings: SyncSettings,
        pending_echo: Option<Document>,
    }

    impl OutlineSync {
        /// Start from a persisted outline and, if present, the persisted document.
        /// Without a document (or with an empty one) the outline is materialized.
        pub fn new(outline: Outline, document: Option<Document>, settings: SyncSettings) -> Self {
            let document = match document {
                Some(doc) if !doc.blocks.is_empty() => doc,
                _ => serialize_outline_with(&outline, &settings),
            };
            Self {
                outline,
                document,
                settings,
                pending_echo: None,
            }
        }

        pub fn outline(&self) -> &Outline {
            &self.outline
        }

        pub fn document(&self) -> &Document {
            &self.document
        }

        pub fn settings(&self) -> &SyncSettings {
            &self.settings
        }

        /// Apply an outline-panel edit and rewrite the document.
        pub fn apply(&mut self, edit: OutlineEdit) -> ReconcileReport {
            let next = match edit {
                OutlineEdit::Add { parent } => {
                    self.outline.add_node_with(parent.as_ref(), &self.settings)
                }
                OutlineEdit::Rename { id, title } => self.outline.rename_node(&id, &title),
                OutlineEdit::Delete { id } => self.outline.delete_node(&id),
                OutlineEdit::Replace(outline) => outline.normalized(&self.settings),
            };
            let Reconciliation { document, report } =
                reconcile_with_settings(&self.document, &next, &self.settings);
            self.outline = next;
            self.document = document;
            self.pending_echo = Some(self.document.clone());
            report
        }

        /// Feed the editor's current document after a change event.
        pub fn on_editor_change(&mut self, document: Document) -> ChangeOutcome {
            if let Some(echo) = self.pending_echo.take() {
                if echo == document {
                    debug!("ignoring echo of outline-driven rewrite");
                    return ChangeOutcome::Echo;
                }
            }

            let Extraction {
                outline,
                document,
                assigned_ids,
            } = extract_outline_with(&document, &self.settings);
            let restamped = !assigned_ids.is_empty();
            self.document = document;
            if restamped {
                self.pending_echo = Some(self.document.clone());
            }

            if outline == self.outline {
                return ChangeOutcome::Unchanged;
            }
            debug!(nodes = outline.node_count(), restamped, "outline re-derived from editor");
            self.outline = outline;
            ChangeOutcome::OutlineChanged { restamped }
        }

        pub fn into_parts(self) -> (Outline, Document) {
            (self.outline, self.document)
        }
    }

}

pub use editor::{document_from_json, document_to_json};
pub use extract::{extract_outline, extract_outline_with};
pub use format::{serialize_outline, serialize_outline_with};
pub use parser::{parse_outline_text, parse_outline_text_with};
pub use reconcile::{reconcile, reconcile_with_settings};

//! The logical entry tree an image is built from.
//!
//! Entries live in a single arena keyed by [`NodeId`]; directories hold
//! ordered lists of child ids and `parent` is a back-reference only, never
//! an ownership edge. Nodes are created while scanning the input, annotated
//! by the naming engine and layout builder, and then consumed unchanged by
//! the writer.

use std::path::Path;
use std::rc::Rc;

use crate::path::IsoPath;
use crate::prelude::*;

type NameBuf = arraystring::ArrayString<arraystring::typenum::U255>;

/// Stable index of an entry within its [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// Content of a file entry, either backed by a host file or in memory.
#[derive(Debug)]
enum FileContentInner {
  File {
    metadata: std::fs::Metadata,
    handle: std::fs::File,
  },
  InMemory(Vec<u8>),
}

/// Content of a file entry, either backed by a host file or in memory.
#[derive(Debug, Clone)]
pub struct FileContent(Rc<FileContentInner>);

impl FileContent {
  pub fn extent(&self) -> u64 {
    match &*self.0 {
      FileContentInner::File { metadata, .. } => metadata.len(),
      FileContentInner::InMemory(vec) => vec.len() as u64,
    }
  }

  pub(crate) fn copy_to<W: std::io::Write>(&self, writer: &mut W) -> Result<u64> {
    match &*self.0 {
      FileContentInner::File { handle, .. } => {
        use std::io::Seek;

        let mut handle = &*handle;
        handle.seek(std::io::SeekFrom::Start(0))?;
        Ok(std::io::copy(&mut std::io::BufReader::new(handle), writer)?)
      }
      FileContentInner::InMemory(vec) => {
        writer.write_all(vec)?;
        Ok(vec.len() as u64)
      }
    }
  }
}

impl TryFrom<std::fs::File> for FileContent {
  type Error = std::io::Error;

  fn try_from(file: std::fs::File) -> std::io::Result<FileContent> {
    Ok(FileContent(Rc::new(FileContentInner::File {
      metadata: file.metadata()?,
      handle: file,
    })))
  }
}

impl From<Vec<u8>> for FileContent {
  fn from(vec: Vec<u8>) -> Self {
    FileContent(Rc::new(FileContentInner::InMemory(vec)))
  }
}

#[derive(Debug)]
pub enum NodeKind {
  Directory { children: Vec<NodeId> },
  File { content: FileContent },
  /// Zero-length placeholder left behind where a deep directory was
  /// relocated into the moved-directories store.
  RelocationMark { target: NodeId },
}

/// On-disc names resolved per naming standard. The views are mutually
/// exclusive and computed independently of each other.
#[derive(Debug, Default, Clone)]
pub(crate) struct ResolvedNames {
  pub iso9660: Option<String>,
  pub joliet: Option<String>,
  pub rock_ridge: Option<String>,
}

#[derive(Debug)]
pub struct Node {
  pub(crate) parent: Option<NodeId>,
  pub(crate) name: NameBuf,
  pub(crate) kind: NodeKind,
  pub(crate) names: ResolvedNames,
  /// Extent location within the ISO 9660 hierarchy.
  pub(crate) extent: Option<u32>,
  /// Extent location within the parallel Joliet hierarchy (directories
  /// only; file data is shared between the hierarchies).
  pub(crate) joliet_extent: Option<u32>,
  pub(crate) data_length: u32,
  pub(crate) joliet_data_length: u32,
  /// POSIX mode resolved from the Rock Ridge permission map.
  pub(crate) posix_mode: Option<u32>,
  /// Previous parent of a relocated directory.
  pub(crate) original_parent: Option<NodeId>,
}

impl Node {
  fn new(parent: Option<NodeId>, name: &str, kind: NodeKind) -> Self {
    Self {
      parent,
      name: NameBuf::from_str_truncate(name),
      kind,
      names: ResolvedNames::default(),
      extent: None,
      joliet_extent: None,
      data_length: 0,
      joliet_data_length: 0,
      posix_mode: None,
      original_parent: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn is_directory(&self) -> bool {
    matches!(self.kind, NodeKind::Directory { .. })
  }

  pub fn children(&self) -> &[NodeId] {
    match &self.kind {
      NodeKind::Directory { children } => children,
      _ => &[],
    }
  }
}

#[derive(Debug)]
pub struct Tree {
  nodes: Vec<Node>,
  root: NodeId,
}

impl Default for Tree {
  fn default() -> Self {
    Self::new()
  }
}

impl Tree {
  pub fn new() -> Self {
    Self {
      nodes: vec![Node::new(None, "", NodeKind::Directory { children: vec![] })],
      root: NodeId(0),
    }
  }

  /// Capture a host directory tree, preserving empty directories.
  pub fn capture(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let mut tree = Self::new();

    for entry in walkdir::WalkDir::new(path).min_depth(1) {
      let entry = entry?;
      let relative = entry
        .path()
        .strip_prefix(path)
        .unwrap_or(entry.path())
        .to_string_lossy()
        .into_owned();

      if entry.file_type().is_dir() {
        tree.make_directories(IsoPath::new(&relative))?;
      } else if entry.file_type().is_file() {
        let content = FileContent::try_from(std::fs::File::open(entry.path())?)?;
        tree.insert_file(&relative, content)?;
      }
    }

    Ok(tree)
  }

  pub fn root(&self) -> NodeId {
    self.root
  }

  pub fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id.0]
  }

  pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
    &mut self.nodes[id.0]
  }

  /// Number of entries excluding the root.
  pub fn len(&self) -> usize {
    self.nodes.len() - 1
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.len() == 1
  }

  fn push(&mut self, node: Node) -> NodeId {
    let id = NodeId(self.nodes.len());
    self.nodes.push(node);
    id
  }

  fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
    self
      .node(parent)
      .children()
      .iter()
      .copied()
      .find(|child| self.node(*child).name() == name)
  }

  /// Add a directory under `parent`, returning the existing child if one
  /// with the same name is already present.
  pub fn add_directory(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
    if let Some(existing) = self.find_child(parent, name) {
      if self.node(existing).is_directory() {
        return Ok(existing);
      }
      return Err(Error::NotAFile(name.into()));
    }

    let id = self.push(Node::new(
      Some(parent),
      name,
      NodeKind::Directory { children: vec![] },
    ));

    match &mut self.node_mut(parent).kind {
      NodeKind::Directory { children } => children.push(id),
      _ => return Err(Error::NotAFile(name.into())),
    }

    Ok(id)
  }

  /// Add a file under `parent`. An existing file of the same name is
  /// replaced.
  pub fn add_file(&mut self, parent: NodeId, name: &str, content: FileContent) -> Result<NodeId> {
    if let Some(existing) = self.find_child(parent, name) {
      if self.node(existing).is_directory() {
        return Err(Error::NotAFile(name.into()));
      }
      self.node_mut(existing).kind = NodeKind::File { content };
      return Ok(existing);
    }

    let id = self.push(Node::new(Some(parent), name, NodeKind::File { content }));

    match &mut self.node_mut(parent).kind {
      NodeKind::Directory { children } => children.push(id),
      _ => return Err(Error::NotAFile(name.into())),
    }

    Ok(id)
  }

  /// Create the directory chain for every component of `path`.
  pub fn make_directories(&mut self, path: &IsoPath) -> Result<NodeId> {
    let mut current = self.root;
    for part in path.components() {
      current = self.add_directory(current, part)?;
    }
    Ok(current)
  }

  /// Insert a file at the given logical path, scaffolding intermediate
  /// directories as needed.
  pub fn insert_file(&mut self, path: impl AsRef<str>, content: FileContent) -> Result<NodeId> {
    let path = path.as_ref();
    let iso_path = IsoPath::new(path);

    let Some(file_name) = iso_path.file_name() else {
      return Err(Error::NotAFile(path.into()));
    };

    let mut parent = self.root;
    let mut components = iso_path.components().peekable();

    while let Some(part) = components.next() {
      if components.peek().is_none() {
        break;
      }
      parent = self.add_directory(parent, part)?;
    }

    self.add_file(parent, file_name, content)
  }

  /// The slash-separated logical path of an entry, rooted at `""`.
  pub fn logical_path(&self, id: NodeId) -> String {
    let mut parts = vec![];
    let mut current = Some(id);

    while let Some(id) = current {
      let node = self.node(id);
      if node.parent.is_some() {
        parts.push(node.name().to_string());
      }
      current = node.parent;
    }

    parts.reverse();
    parts.join("/")
  }

  /// Nesting depth of an entry; root children are at depth 1.
  pub(crate) fn depth(&self, id: NodeId) -> usize {
    let mut depth = 0;
    let mut current = self.node(id).parent;

    while let Some(id) = current {
      depth += 1;
      current = self.node(id).parent;
    }

    depth
  }

  /// All directory ids in breadth-first order, root first.
  pub(crate) fn directories_breadth_first(&self) -> Vec<NodeId> {
    let mut order = vec![];
    let mut queue = std::collections::VecDeque::from([self.root]);

    while let Some(id) = queue.pop_front() {
      order.push(id);

      for child in self.node(id).children() {
        if self.node(*child).is_directory() {
          queue.push_back(*child);
        }
      }
    }

    order
  }

  /// Move a directory into the store, leaving a relocation placeholder in
  /// its original parent.
  pub(crate) fn relocate_directory(&mut self, dir: NodeId, store: NodeId) {
    let Some(old_parent) = self.node(dir).parent else {
      return;
    };
    let name = self.node(dir).name().to_string();

    let mark = self.push(Node::new(
      Some(old_parent),
      &name,
      NodeKind::RelocationMark { target: dir },
    ));

    if let NodeKind::Directory { children } = &mut self.node_mut(old_parent).kind {
      if let Some(slot) = children.iter().position(|c| *c == dir) {
        children[slot] = mark;
      }
    }

    if let NodeKind::Directory { children } = &mut self.node_mut(store).kind {
      children.push(dir);
    }

    let node = self.node_mut(dir);
    node.original_parent = Some(old_parent);
    node.parent = Some(store);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_scaffolds_intermediate_directories() {
    let mut tree = Tree::new();
    let file = tree
      .insert_file("docs/guide/intro.txt", Vec::new().into())
      .unwrap();

    assert_eq!(tree.logical_path(file), "docs/guide/intro.txt");
    assert_eq!(tree.depth(file), 3);
    assert_eq!(tree.len(), 3);

    // Reusing the same directories must not duplicate them.
    tree
      .insert_file("docs/guide/outro.txt", Vec::new().into())
      .unwrap();
    assert_eq!(tree.len(), 4);
  }

  #[test]
  fn breadth_first_directories_start_at_root() {
    let mut tree = Tree::new();
    tree.insert_file("a/b/f.txt", Vec::new().into()).unwrap();
    tree.insert_file("c/g.txt", Vec::new().into()).unwrap();

    let order = tree.directories_breadth_first();
    let names = order
      .iter()
      .map(|id| tree.node(*id).name().to_string())
      .collect::<Vec<_>>();
    assert_eq!(names, vec!["", "a", "c", "b"]);
  }

  #[test]
  fn relocation_swaps_in_a_placeholder() {
    let mut tree = Tree::new();
    let deep = tree.make_directories(IsoPath::new("a/b/deep")).unwrap();
    let store = tree.add_directory(tree.root(), "moved").unwrap();

    tree.relocate_directory(deep, store);

    assert_eq!(tree.logical_path(deep), "moved/deep");
    assert_eq!(tree.node(deep).original_parent, {
      let b = tree.find_child(tree.find_child(tree.root(), "a").unwrap(), "b");
      b
    });

    let b = tree.find_child(tree.find_child(tree.root(), "a").unwrap(), "b").unwrap();
    let placeholder = tree.node(b).children()[0];
    assert!(matches!(
      tree.node(placeholder).kind,
      NodeKind::RelocationMark { target } if target == deep
    ));
  }
}

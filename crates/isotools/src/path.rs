//! Slash-separated logical paths within an image.

/// Borrowed view of a logical image path. Accepts both `/` and `\` as
/// separators on input; logical paths are rendered with `/`.
#[derive(Debug)]
#[repr(transparent)]
pub struct IsoPath(str);

impl IsoPath {
  pub fn new<S: AsRef<str> + ?Sized>(s: &S) -> &Self {
    unsafe { &*(s.as_ref() as *const str as *const IsoPath) }
  }

  /// Returns the non-empty components of this path as an iterator.
  pub fn components(&self) -> Components<'_> {
    Components { path: &self.0 }
  }

  /// The final component, if any.
  pub fn file_name(&self) -> Option<&str> {
    self.components().last()
  }
}

impl AsRef<IsoPath> for str {
  fn as_ref(&self) -> &IsoPath {
    IsoPath::new(self)
  }
}

pub struct Components<'a> {
  path: &'a str,
}

impl<'a> Iterator for Components<'a> {
  type Item = &'a str;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if self.path.is_empty() {
        return None;
      }

      let part = if let Some(pos) = self.path.find(['/', '\\']) {
        let part = &self.path[..pos];
        self.path = &self.path[pos + 1..];
        part
      } else {
        let part = self.path;
        self.path = "";
        part
      };

      // Skip empty components from leading, trailing or doubled separators.
      if !part.is_empty() {
        return Some(part);
      }
    }
  }
}

//! Extra-field registry — typed TLV records attachable to a dirent,
//! with local/central scope flags.

/// Known extra-field ids. The codec filters these out of whatever a
/// caller sees through `Dirent::extra_fields` and manages them itself
/// (ZIP64 sizes/offset, WinZip-AES parameters, UTF-8 name/comment).
pub const ID_ZIP64: u16 = 0x0001;
pub const ID_WINZIP_AES: u16 = 0x9901;
pub const ID_UTF8_NAME: u16 = 0x7075;
pub const ID_UTF8_COMMENT: u16 = 0x6375;

/// Where an extra field applies: the local header, the central
/// directory header, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    bits: u8,
}

impl Scope {
    pub const LOCAL: Scope = Scope { bits: 0b01 };
    pub const CENTRAL: Scope = Scope { bits: 0b10 };
    pub const BOTH: Scope = Scope { bits: 0b11 };

    pub fn contains(&self, other: Scope) -> bool {
        self.bits & other.bits != 0
    }

    pub fn union(&self, other: Scope) -> Scope {
        Scope { bits: self.bits | other.bits }
    }
}

/// A single TLV extra-field record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    pub id: u16,
    pub data: Vec<u8>,
    pub scope: Scope,
}

impl ExtraField {
    pub fn new(id: u16, data: Vec<u8>, scope: Scope) -> Self {
        ExtraField { id, data, scope }
    }

    /// On-disk size of this record (4-byte TLV header + payload).
    pub fn encoded_len(&self) -> usize {
        4 + self.data.len()
    }

    fn key(&self) -> (u16, usize, &[u8]) {
        (self.id, self.data.len(), &self.data)
    }
}

/// Ordered collection of extra fields attached to one dirent.
///
/// Order of insertion is preserved on purpose: writers that care about
/// byte-exact round trips rely on re-emitting fields in the order they
/// were read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFieldList {
    fields: Vec<ExtraField>,
}

impl ExtraFieldList {
    pub fn new() -> Self {
        ExtraFieldList { fields: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtraField> {
        self.fields.iter()
    }

    pub fn push(&mut self, field: ExtraField) {
        self.fields.push(field);
    }

    /// All fields with the given id, in order, restricted to those
    /// whose scope intersects `scope`.
    pub fn get_all(&self, id: u16, scope: Scope) -> Vec<&ExtraField> {
        self.fields.iter().filter(|f| f.id == id && f.scope.contains(scope)).collect()
    }

    /// The `index`-th occurrence (0-based) of `id` within `scope`.
    pub fn get(&self, id: u16, index: usize, scope: Scope) -> Option<&ExtraField> {
        self.get_all(id, scope).into_iter().nth(index)
    }

    /// Remove the `index`-th occurrence (0-based) of `id` whose scope
    /// intersects `scope`. Returns the removed field, if any.
    pub fn delete_by_id(&mut self, id: u16, index: usize, scope: Scope) -> Option<ExtraField> {
        let mut seen = 0usize;
        let pos = self.fields.iter().position(|f| {
            if f.id == id && f.scope.contains(scope) {
                if seen == index {
                    return true;
                }
                seen += 1;
            }
            false
        })?;
        Some(self.fields.remove(pos))
    }

    /// Filter out ids the codec manages internally (ZIP64, WinZip-AES,
    /// UTF-8 name/comment) so a caller never sees them through the
    /// public extra-field API.
    pub fn remove_internal(&self) -> ExtraFieldList {
        let fields = self
            .fields
            .iter()
            .filter(|f| {
                !matches!(f.id, ID_ZIP64 | ID_WINZIP_AES | ID_UTF8_NAME | ID_UTF8_COMMENT)
            })
            .cloned()
            .collect();
        ExtraFieldList { fields }
    }

    /// Append every field of `other` not already present by exact
    /// `(id, size, bytes)` equality; when a duplicate is found its
    /// scope is OR-combined into the existing entry instead.
    pub fn merge(&mut self, other: &ExtraFieldList) {
        for incoming in &other.fields {
            if let Some(existing) = self
                .fields
                .iter_mut()
                .find(|f| f.key() == incoming.key())
            {
                existing.scope = existing.scope.union(incoming.scope);
            } else {
                self.fields.push(incoming.clone());
            }
        }
    }

    /// Total on-disk size of members whose scope intersects `scope`.
    pub fn encoded_len(&self, scope: Scope) -> usize {
        self.fields.iter().filter(|f| f.scope.contains(scope)).map(ExtraField::encoded_len).sum()
    }

    /// Serialize members whose scope intersects `scope`, in order.
    pub fn encode(&self, scope: Scope) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len(scope));
        for f in self.fields.iter().filter(|f| f.scope.contains(scope)) {
            out.extend_from_slice(&f.id.to_le_bytes());
            out.extend_from_slice(&(f.data.len() as u16).to_le_bytes());
            out.extend_from_slice(&f.data);
        }
        out
    }

    /// Parse a raw extra-field blob as read from a local or central
    /// header; every field is tagged with `scope_of_origin` (the
    /// record doesn't self-describe which header(s) it came from).
    pub fn parse(bytes: &[u8], scope_of_origin: Scope) -> ExtraFieldList {
        let mut fields = Vec::new();
        let mut i = 0usize;
        while i + 4 <= bytes.len() {
            let id = u16::from_le_bytes([bytes[i], bytes[i + 1]]);
            let len = u16::from_le_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
            i += 4;
            if i + len > bytes.len() {
                break;
            }
            fields.push(ExtraField::new(id, bytes[i..i + len].to_vec(), scope_of_origin));
            i += len;
        }
        ExtraFieldList { fields }
    }
}

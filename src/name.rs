//! Type-Name Codec
//!
//! Turns type descriptors into canonical name strings and back. Registered
//! types travel under their storage name with the registry marker suffix, so
//! the encoded form survives renames of the host type. Unregistered types
//! pass through under their host-native path. Generic arguments are encoded
//! recursively in both branches:
//!
//! ```text
//! Name       := Registered | Native
//! Registered := StorageName ["`" Arity "[" ArgList "]"] "," ">stowage<"
//! Native     := Path ["<" ArgList ">"]
//! ArgList    := "[" Name "]" ("," "[" Name "]")*
//! ```
//!
//! Argument substitution in the native branch is positional, anchored to the
//! angle-bracket list, never free-text replacement, which breaks as soon as
//! one argument's name is a substring of another.
//!
//! Encoded names arriving from stored data are untrusted input: parsing is a
//! bounded recursive descent with a hard nesting cap.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::error::{DecodeError, RegistryError, Result};
use crate::meta::TypeMeta;
use crate::registry::TypeRegistry;

/// Sentinel suffix distinguishing registry-resolved names from host-native
/// paths.
pub const REGISTRY_MARKER: &str = ">stowage<";

/// Generic-nesting cap for both encoding and parsing.
const MAX_DEPTH: usize = 32;

/// Base of a type name: resolved through the registry, or a host-native path
/// taken verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseName {
    Registered(String),
    Native(String),
}

/// Typed intermediate representation of the name grammar. A node is a base
/// plus zero or more recursively named generic arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub base: BaseName,
    pub args: Vec<TypeName>,
}

impl TypeName {
    pub fn registered(name: impl Into<String>) -> Self {
        Self {
            base: BaseName::Registered(name.into()),
            args: Vec::new(),
        }
    }

    pub fn native(path: impl Into<String>) -> Self {
        Self {
            base: BaseName::Native(path.into()),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<TypeName>) -> Self {
        self.args = args;
        self
    }

    /// Encode into the canonical string form.
    pub fn encode(&self) -> String {
        match &self.base {
            BaseName::Native(path) if self.args.is_empty() => path.clone(),
            BaseName::Native(path) => {
                let mut out = path.clone();
                out.push('<');
                push_arg_list(&mut out, &self.args);
                out.push('>');
                out
            }
            BaseName::Registered(name) if self.args.is_empty() => {
                format!("{name},{REGISTRY_MARKER}")
            }
            BaseName::Registered(name) => {
                let mut out = format!("{name}`{}[", self.args.len());
                push_arg_list(&mut out, &self.args);
                out.push_str("],");
                out.push_str(REGISTRY_MARKER);
                out
            }
        }
    }

    /// Parse a canonical name string back into the typed representation.
    pub fn parse(input: &str) -> std::result::Result<Self, DecodeError> {
        parse_at(input.trim(), 0)
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn push_arg_list(out: &mut String, args: &[TypeName]) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('[');
        out.push_str(&arg.encode());
        out.push(']');
    }
}

fn malformed(input: &str, reason: impl Into<String>) -> DecodeError {
    DecodeError::MalformedName {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn parse_at(s: &str, depth: usize) -> std::result::Result<TypeName, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep { max: MAX_DEPTH });
    }
    let s = s.trim();
    if s.is_empty() {
        return Err(malformed(s, "empty name"));
    }
    match registered_body(s) {
        Some(body) => parse_registered(body, s, depth),
        None => parse_native(s, depth),
    }
}

/// Strip the `",<marker>"` suffix, yielding the registered body.
fn registered_body(s: &str) -> Option<&str> {
    let stripped = s.strip_suffix(REGISTRY_MARKER)?.trim_end();
    stripped.strip_suffix(',').map(str::trim_end)
}

fn parse_registered(
    body: &str,
    full: &str,
    depth: usize,
) -> std::result::Result<TypeName, DecodeError> {
    let Some(tick) = body.find('`') else {
        if body.is_empty() {
            return Err(malformed(full, "empty storage name"));
        }
        if body.contains(['[', ']', '<', '>']) {
            return Err(malformed(full, "storage name contains grammar characters"));
        }
        return Ok(TypeName::registered(body));
    };

    let base = &body[..tick];
    if base.is_empty() {
        return Err(malformed(full, "empty storage name before arity"));
    }
    let rest = &body[tick + 1..];
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return Err(malformed(full, "missing arity after `"));
    }
    let arity: usize = rest[..digits]
        .parse()
        .map_err(|_| malformed(full, "unreadable arity"))?;
    let list = &rest[digits..];
    if !list.starts_with('[') || !list.ends_with(']') {
        return Err(malformed(full, "arity not followed by a bracketed argument list"));
    }

    let args = parse_arg_list(&list[1..list.len() - 1], full, depth)?;
    if args.len() != arity {
        return Err(malformed(
            full,
            format!("arity {} does not match {} arguments", arity, args.len()),
        ));
    }
    Ok(TypeName::registered(base).with_args(args))
}

fn parse_native(s: &str, depth: usize) -> std::result::Result<TypeName, DecodeError> {
    let Some(open) = find_top_level(s, '<') else {
        if s.contains(['[', ']']) {
            return Err(malformed(s, "unexpected bracket in native name"));
        }
        return Ok(TypeName::native(s));
    };

    let base = s[..open].trim_end();
    if base.is_empty() {
        return Err(malformed(s, "empty native path before argument list"));
    }
    let close = find_matching(s, open).ok_or_else(|| malformed(s, "unbalanced angle brackets"))?;
    if close != s.len() - 1 {
        return Err(malformed(s, "trailing characters after argument list"));
    }

    let args = parse_arg_list(&s[open + 1..close], s, depth)?;
    Ok(TypeName::native(base).with_args(args))
}

fn parse_arg_list(
    inner: &str,
    full: &str,
    depth: usize,
) -> std::result::Result<Vec<TypeName>, DecodeError> {
    let mut args = Vec::new();
    for piece in split_top_level(inner, full)? {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(malformed(full, "empty argument"));
        }
        // Arguments are bracket-wrapped on encode; plain native arguments are
        // tolerated on decode for resilience against hand-written names.
        let arg = if piece.starts_with('[') && piece.ends_with(']') {
            parse_at(&piece[1..piece.len() - 1], depth + 1)?
        } else {
            parse_at(piece, depth + 1)?
        };
        args.push(arg);
    }
    if args.is_empty() {
        return Err(malformed(full, "empty argument list"));
    }
    Ok(args)
}

/// Split on top-level commas, treating the registry marker as an opaque token
/// (it contains angle-bracket characters that are not grammar).
fn split_top_level<'a>(
    s: &'a str,
    full: &str,
) -> std::result::Result<Vec<&'a str>, DecodeError> {
    let mut pieces = Vec::new();
    let mut level = 0i32;
    let mut start = 0usize;
    let mut i = 0usize;
    let bytes = s.as_bytes();
    while i < bytes.len() {
        if s[i..].starts_with(REGISTRY_MARKER) {
            i += REGISTRY_MARKER.len();
            continue;
        }
        match bytes[i] {
            b'[' | b'<' => level += 1,
            b']' | b'>' => {
                level -= 1;
                if level < 0 {
                    return Err(malformed(full, "unbalanced brackets"));
                }
            }
            b',' if level == 0 => {
                pieces.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if level != 0 {
        return Err(malformed(full, "unbalanced brackets"));
    }
    pieces.push(&s[start..]);
    Ok(pieces)
}

/// Index of the `>` matching the `<` at `open`, marker-aware.
fn find_matching(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut level = 0i32;
    let mut i = open;
    while i < bytes.len() {
        if s[i..].starts_with(REGISTRY_MARKER) {
            i += REGISTRY_MARKER.len();
            continue;
        }
        match bytes[i] {
            b'<' | b'[' => level += 1,
            b'>' | b']' => {
                level -= 1;
                if level == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// First top-level occurrence of `needle`, marker-aware.
fn find_top_level(s: &str, needle: char) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut level = 0i32;
    let mut i = 0usize;
    while i < bytes.len() {
        if s[i..].starts_with(REGISTRY_MARKER) {
            i += REGISTRY_MARKER.len();
            continue;
        }
        let c = bytes[i];
        if level == 0 && c == needle as u8 {
            return Some(i);
        }
        match c {
            b'<' | b'[' => level += 1,
            b'>' | b']' => level -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// A name resolved against the registry: the entry for the base plus the
/// resolved generic arguments. Equality of two decodes is registry identity
/// of the metas, regardless of how the strings were spelled.
#[derive(Debug, Clone)]
pub struct DecodedType {
    pub meta: Arc<TypeMeta>,
    pub args: Vec<DecodedType>,
}

/// Resolve a parsed name against the registry.
///
/// The arity suffix was already consumed structurally by the parser. A base
/// without arguments resolves by name alone; a generic base resolves the
/// arguments first and then selects the monomorphization whose declared
/// argument types match them exactly, so every monomorphization of a family
/// decodes back to its own registry entry.
pub fn resolve(
    name: &TypeName,
    registry: &TypeRegistry,
) -> std::result::Result<DecodedType, DecodeError> {
    let args = name
        .args
        .iter()
        .map(|arg| resolve(arg, registry))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let arg_ids: Vec<TypeId> = args.iter().map(|arg| arg.meta.type_id()).collect();

    let meta = match &name.base {
        BaseName::Registered(n) if arg_ids.is_empty() => registry
            .lookup(n)
            .ok_or_else(|| DecodeError::UnknownRegisteredName(n.clone()))?,
        BaseName::Registered(n) => registry
            .lookup_monomorphization(n, &arg_ids)
            .ok_or_else(|| DecodeError::UnknownRegisteredName(n.clone()))?,
        BaseName::Native(path) if arg_ids.is_empty() => registry
            .lookup_native(path)
            .ok_or_else(|| DecodeError::UnresolvedNative(path.clone()))?,
        BaseName::Native(path) => registry
            .lookup_native_monomorphization(path, &arg_ids)
            .ok_or_else(|| DecodeError::UnresolvedNative(path.clone()))?,
    };
    Ok(DecodedType { meta, args })
}

/// Parse and resolve in one step.
pub fn decode(
    input: &str,
    registry: &TypeRegistry,
) -> std::result::Result<DecodedType, DecodeError> {
    let name = TypeName::parse(input)?;
    resolve(&name, registry)
}

/// Build the name tree for a known type from its descriptor and declared
/// generic arguments.
pub fn type_name_of(registry: &TypeRegistry, id: TypeId) -> Result<TypeName> {
    build_name(registry, id, 0)
}

/// Convenience: the encoded canonical string for a known type.
pub fn encode_type(registry: &TypeRegistry, id: TypeId) -> Result<String> {
    Ok(type_name_of(registry, id)?.encode())
}

fn build_name(registry: &TypeRegistry, id: TypeId, depth: usize) -> Result<TypeName> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep { max: MAX_DEPTH }.into());
    }
    let meta = registry.lookup_id(id).ok_or_else(|| RegistryError::NotFound {
        name: format!("{id:?}"),
    })?;

    let base = match meta.storage_name() {
        Some(name) => BaseName::Registered(name.to_string()),
        // The host path of a generic monomorphization already spells out its
        // arguments; keep only the path so substitution stays positional.
        None if meta.is_generic() => BaseName::Native(bare_path(meta.native_name()).to_string()),
        None => BaseName::Native(meta.native_name().to_string()),
    };

    let mut args = Vec::with_capacity(meta.arity());
    for (i, arg_id) in meta.generic_args().iter().enumerate() {
        if registry.lookup_id(*arg_id).is_none() {
            return Err(RegistryError::NotFound {
                name: format!("generic argument {} of {}", i, meta.describe()),
            }
            .into());
        }
        args.push(build_name(registry, *arg_id, depth + 1)?);
    }
    Ok(TypeName { base, args })
}

/// Host path without the monomorphization's own `<...>` suffix.
pub(crate) fn bare_path(native: &str) -> &str {
    native.split('<').next().unwrap_or(native)
}

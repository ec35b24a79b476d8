use std::collections::HashSet;

use crate::error::Error;
use crate::parameter::{bare_name, Parameter};
use crate::types::Value;

/// Ordered, name-addressable set of [`Parameter`]s owned by one command.
///
/// Names are compared without their leading `@`, so `@state` and `state` address the same entry.
/// Uniqueness is only enforced by [`ParameterCollection::validate`], not on insert.
///
/// Name lookups have one contract: [`ParameterCollection::index_of`] and
/// [`ParameterCollection::contains`] report absence as `None`/`false`, every other by-name
/// operation fails with [`Error::NoSuchParameter`].
#[derive(Clone, PartialEq, Debug, Default)]
pub struct ParameterCollection {
    items: Vec<Parameter>,
}

impl ParameterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends the parameter and returns its index.
    pub fn add(&mut self, parameter: Parameter) -> usize {
        self.items.push(parameter);
        self.items.len() - 1
    }

    pub fn add_with_value(&mut self, name: impl Into<String>, value: impl Into<Value>) -> usize {
        self.add(Parameter::with_value(name, value))
    }

    pub fn add_range(&mut self, parameters: impl IntoIterator<Item = Parameter>) {
        self.items.extend(parameters);
    }

    /// Inserts at `index`; `index == len()` appends.
    pub fn insert(&mut self, index: usize, parameter: Parameter) -> Result<(), Error> {
        if index > self.items.len() {
            return Err(self.out_of_range(index));
        }
        self.items.insert(index, parameter);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<&Parameter, Error> {
        let count = self.items.len();
        self.items.get(index).ok_or(Error::IndexOutOfRange { index, count })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Parameter, Error> {
        let count = self.items.len();
        self.items.get_mut(index).ok_or(Error::IndexOutOfRange { index, count })
    }

    pub fn get_by_name(&self, name: &str) -> Result<&Parameter, Error> {
        let index = self.require_index(name)?;
        Ok(&self.items[index])
    }

    pub fn get_by_name_mut(&mut self, name: &str) -> Result<&mut Parameter, Error> {
        let index = self.require_index(name)?;
        Ok(&mut self.items[index])
    }

    pub fn set(&mut self, index: usize, parameter: Parameter) -> Result<(), Error> {
        *self.get_mut(index)? = parameter;
        Ok(())
    }

    pub fn set_by_name(&mut self, name: &str, parameter: Parameter) -> Result<(), Error> {
        *self.get_by_name_mut(name)? = parameter;
        Ok(())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        let name = bare_name(name);
        self.items.iter().position(|p| p.bare_name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Parameter, Error> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        Ok(self.items.remove(index))
    }

    pub fn remove_by_name(&mut self, name: &str) -> Result<Parameter, Error> {
        let index = self.require_index(name)?;
        Ok(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Clones every member into `target` starting at `index`.
    pub fn copy_to(&self, target: &mut [Parameter], index: usize) -> Result<(), Error> {
        let end = index
            .checked_add(self.items.len())
            .filter(|end| *end <= target.len())
            .ok_or(Error::IndexOutOfRange {
                index,
                count: target.len(),
            })?;
        target[index..end].clone_from_slice(&self.items);
        Ok(())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Parameter> {
        self.items.iter_mut()
    }

    /// Fails on the first duplicated name, then on the first member that is itself invalid.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = HashSet::with_capacity(self.items.len());
        for p in &self.items {
            if !seen.insert(p.bare_name()) {
                return Err(Error::DuplicateParameter(p.name().to_string()));
            }
        }
        self.items.iter().try_for_each(Parameter::validate)
    }

    /// Replaces every `@name` token of a member in one left-to-right pass with the member's
    /// literal. Substituted text is never rescanned and `@@variable` tokens are left as is.
    pub(crate) fn substitute(&self, text: &str) -> String {
        if self.items.is_empty() {
            return text.to_string();
        }
        let mut result = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(at) = rest.find('@') {
            result.push_str(&rest[..at]);
            let after = &rest[at + 1..];
            if let Some(stripped) = after.strip_prefix('@') {
                let len = identifier_len(stripped);
                result.push_str(&rest[at..at + 2 + len]);
                rest = &stripped[len..];
                continue;
            }
            let len = identifier_len(after);
            let token = &after[..len];
            match self.items.iter().find(|p| !token.is_empty() && p.bare_name() == token) {
                Some(p) => result.push_str(&p.to_sql_literal()),
                None => result.push_str(&rest[at..at + 1 + len]),
            }
            rest = &after[len..];
        }
        result.push_str(rest);
        result
    }

    fn require_index(&self, name: &str) -> Result<usize, Error> {
        self.index_of(name)
            .ok_or_else(|| Error::NoSuchParameter(name.to_string()))
    }

    fn out_of_range(&self, index: usize) -> Error {
        Error::IndexOutOfRange {
            index,
            count: self.items.len(),
        }
    }
}

fn identifier_len(text: &str) -> usize {
    text.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len())
}

impl<'a> IntoIterator for &'a ParameterCollection {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for ParameterCollection {
    type Item = Parameter;
    type IntoIter = std::vec::IntoIter<Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl FromIterator<Parameter> for ParameterCollection {
    fn from_iter<T: IntoIterator<Item = Parameter>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

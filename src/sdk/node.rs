//! Capability-checked access to node map entries.
//!
//! A node may only be written after confirming it is both available and
//! writable on the connected device. The wrappers here perform that check
//! in their constructor; holding one is proof the check passed.

use super::{NodeMap, SdkError};
use thiserror::Error;

/// Availability and access mode of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeAccess {
    /// The device implements the node and it is currently usable.
    pub available: bool,
    /// Reads are permitted.
    pub readable: bool,
    /// Writes are permitted.
    pub writable: bool,
}

impl NodeAccess {
    /// Available, readable and writable.
    pub const READ_WRITE: NodeAccess = NodeAccess {
        available: true,
        readable: true,
        writable: true,
    };

    /// Available and readable only.
    pub const READ_ONLY: NodeAccess = NodeAccess {
        available: true,
        readable: true,
        writable: false,
    };

    /// Not implemented or not currently available on the device.
    pub const UNAVAILABLE: NodeAccess = NodeAccess {
        available: false,
        readable: false,
        writable: false,
    };

    /// Available and readable.
    #[inline]
    pub fn is_available_and_readable(&self) -> bool {
        self.available && self.readable
    }

    /// Available and writable.
    #[inline]
    pub fn is_available_and_writable(&self) -> bool {
        self.available && self.writable
    }
}

/// Errors from checked node access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The node is not available.
    #[error("node {0} is unavailable")]
    Unavailable(String),
    /// The node cannot be read.
    #[error("node {0} is not readable")]
    NotReadable(String),
    /// The node cannot be written.
    #[error("node {0} is not writable")]
    NotWritable(String),
    #[error("node {node}: {source}")]
    /// The SDK call on the node failed.
    Sdk {
        /// Node name.
        node: String,
        /// Underlying error.
        #[source]
        source: SdkError,
    },
}

impl NodeError {
    /// Name of the node the error refers to.
    pub fn node(&self) -> &str {
        match self {
            NodeError::Unavailable(node)
            | NodeError::NotReadable(node)
            | NodeError::NotWritable(node)
            | NodeError::Sdk { node, .. } => node,
        }
    }

    fn sdk(node: &str) -> impl FnOnce(SdkError) -> NodeError + '_ {
        move |source| NodeError::Sdk {
            node: node.to_string(),
            source,
        }
    }
}

fn require_writable(name: &str, access: NodeAccess) -> Result<(), NodeError> {
    if !access.available {
        return Err(NodeError::Unavailable(name.to_string()));
    }
    if !access.writable {
        return Err(NodeError::NotWritable(name.to_string()));
    }
    Ok(())
}

fn require_readable(name: &str, access: NodeAccess) -> Result<(), NodeError> {
    if !access.available {
        return Err(NodeError::Unavailable(name.to_string()));
    }
    if !access.readable {
        return Err(NodeError::NotReadable(name.to_string()));
    }
    Ok(())
}

/// An integer node confirmed writable.
pub struct WritableInteger<'a, N: NodeMap + ?Sized> {
    map: &'a mut N,
    name: &'a str,
    min: i64,
    max: i64,
}

impl<'a, N: NodeMap + ?Sized> WritableInteger<'a, N> {
    /// Checks that `name` is available and writable and reads its bounds.
    pub fn acquire(map: &'a mut N, name: &'a str) -> Result<Self, NodeError> {
        let access = map.access(name).map_err(NodeError::sdk(name))?;
        require_writable(name, access)?;
        let (min, max) = map.integer_bounds(name).map_err(NodeError::sdk(name))?;
        Ok(Self {
            map,
            name,
            min,
            max,
        })
    }

    /// Node name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Smallest accepted value.
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Largest accepted value.
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Limits `value` to the node's bounds.
    pub fn clamp(&self, value: i64) -> i64 {
        value.min(self.max).max(self.min)
    }

    /// Writes `value` to the node.
    pub fn set(&mut self, value: i64) -> Result<(), NodeError> {
        self.map
            .set_integer(self.name, value)
            .map_err(NodeError::sdk(self.name))
    }
}

/// An enumeration entry confirmed readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadableEnumEntry<'a> {
    entry: &'a str,
    value: i64,
}

impl<'a> ReadableEnumEntry<'a> {
    /// Checks that `entry` of the enumeration `name` is readable and reads its value.
    pub fn acquire<N: NodeMap + ?Sized>(
        map: &N,
        name: &str,
        entry: &'a str,
    ) -> Result<Self, NodeError> {
        let access = map
            .enum_entry_access(name, entry)
            .map_err(NodeError::sdk(name))?;
        require_readable(&format!("{name}::{entry}"), access)?;
        let value = map
            .enum_entry_value(name, entry)
            .map_err(NodeError::sdk(name))?;
        Ok(Self { entry, value })
    }

    /// Entry symbolic name.
    pub fn entry(&self) -> &str {
        self.entry
    }

    /// Integer value to write to the enumeration.
    pub fn value(&self) -> i64 {
        self.value
    }
}

/// An enumeration node confirmed readable and writable.
pub struct WritableEnum<'a, N: NodeMap + ?Sized> {
    map: &'a mut N,
    name: &'a str,
}

impl<'a, N: NodeMap + ?Sized> WritableEnum<'a, N> {
    /// Checks that `name` is available, readable and writable.
    pub fn acquire(map: &'a mut N, name: &'a str) -> Result<Self, NodeError> {
        let access = map.access(name).map_err(NodeError::sdk(name))?;
        require_readable(name, access)?;
        require_writable(name, access)?;
        Ok(Self { map, name })
    }

    /// Node name.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Selects `entry`, returning the integer value that was written.
    pub fn set_entry(&mut self, entry: &str) -> Result<i64, NodeError> {
        let value = ReadableEnumEntry::acquire(&*self.map, self.name, entry)?.value();
        self.map
            .set_enum(self.name, value)
            .map_err(NodeError::sdk(self.name))?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::SdkResult;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TableNodes {
        access: HashMap<&'static str, NodeAccess>,
        values: HashMap<String, i64>,
        writes: usize,
    }

    impl NodeMap for TableNodes {
        fn access(&self, name: &str) -> SdkResult<NodeAccess> {
            self.access
                .get(name)
                .copied()
                .ok_or_else(|| SdkError::NotFound(name.to_string()))
        }

        fn integer_bounds(&self, _name: &str) -> SdkResult<(i64, i64)> {
            Ok((16, 1024))
        }

        fn set_integer(&mut self, name: &str, value: i64) -> SdkResult<()> {
            self.writes += 1;
            self.values.insert(name.to_string(), value);
            Ok(())
        }

        fn enum_entry_access(&self, _name: &str, entry: &str) -> SdkResult<NodeAccess> {
            Ok(if entry == "Mono8" {
                NodeAccess::READ_ONLY
            } else {
                NodeAccess::UNAVAILABLE
            })
        }

        fn enum_entry_value(&self, _name: &str, _entry: &str) -> SdkResult<i64> {
            Ok(0x0108_0001)
        }

        fn set_enum(&mut self, name: &str, value: i64) -> SdkResult<()> {
            self.writes += 1;
            self.values.insert(name.to_string(), value);
            Ok(())
        }
    }

    fn nodes() -> TableNodes {
        let mut nodes = TableNodes::default();
        nodes.access.insert("Width", NodeAccess::READ_WRITE);
        nodes.access.insert("Height", NodeAccess::READ_ONLY);
        nodes.access.insert("OffsetX", NodeAccess::UNAVAILABLE);
        nodes.access.insert("PixelFormat", NodeAccess::READ_WRITE);
        nodes
    }

    #[test]
    fn test_writable_integer_clamps_and_sets() {
        let mut nodes = nodes();
        let mut width = WritableInteger::acquire(&mut nodes, "Width").unwrap();
        assert_eq!(width.clamp(4096), 1024);
        assert_eq!(width.clamp(1), 16);
        assert_eq!(width.clamp(640), 640);
        width.set(640).unwrap();
        assert_eq!(nodes.values["Width"], 640);
    }

    #[test]
    fn test_read_only_node_rejected_without_write() {
        let mut nodes = nodes();
        let err = WritableInteger::acquire(&mut nodes, "Height").err().unwrap();
        assert_eq!(err, NodeError::NotWritable("Height".into()));
        assert_eq!(err.node(), "Height");

        let err = WritableInteger::acquire(&mut nodes, "OffsetX").err().unwrap();
        assert_eq!(err, NodeError::Unavailable("OffsetX".into()));
        assert_eq!(nodes.writes, 0);
    }

    #[test]
    fn test_missing_node_reports_name() {
        let mut nodes = nodes();
        let err = WritableInteger::acquire(&mut nodes, "Gain").err().unwrap();
        assert_eq!(err.node(), "Gain");
        assert!(matches!(err, NodeError::Sdk { source: SdkError::NotFound(_), .. }));
    }

    #[test]
    fn test_enum_entry_checked_before_write() {
        let mut nodes = nodes();
        let mut format = WritableEnum::acquire(&mut nodes, "PixelFormat").unwrap();
        assert_eq!(format.set_entry("Mono8").unwrap(), 0x0108_0001);
        assert!(matches!(
            format.set_entry("Mono14"),
            Err(NodeError::Unavailable(_))
        ));
        assert_eq!(nodes.writes, 1);
    }
}

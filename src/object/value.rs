//! Display values of object handles.

use crate::{
    memory::BytesAndOffset,
    object::{ObjectData, ObjectDataKind},
    CachedSnapshot,
};

/// Formats an address with the width of the captured process's pointers.
pub(crate) fn format_address(address: u64, pointer_size: u32) -> String {
    if pointer_size == 4 {
        format!("0x{address:08X}")
    } else {
        format!("0x{address:016X}")
    }
}

/// Decodes a value of one of the runtime's primitive types, `None` for everything else.
fn primitive_to_string(
    snapshot: &CachedSnapshot,
    type_index: usize,
    data: BytesAndOffset<'_>,
) -> Option<String> {
    let value = match snapshot.types().name(type_index) {
        "System.Boolean" => data.read_bool().ok()?.to_string(),
        "System.Char" => data.read_char().ok()?.to_string(),
        "System.SByte" => data.read::<i8>().ok()?.to_string(),
        "System.Byte" => data.read::<u8>().ok()?.to_string(),
        "System.Int16" => data.read_i16().ok()?.to_string(),
        "System.UInt16" => data.read_u16().ok()?.to_string(),
        "System.Int32" => data.read_i32().ok()?.to_string(),
        "System.UInt32" => data.read_u32().ok()?.to_string(),
        "System.Int64" => data.read_i64().ok()?.to_string(),
        "System.UInt64" => data.read_u64().ok()?.to_string(),
        "System.Single" => data.read_f32().ok()?.to_string(),
        "System.Double" => data.read_f64().ok()?.to_string(),
        "System.IntPtr" | "System.UIntPtr" => {
            format_address(data.read_pointer().ok()?, data.pointer_size())
        }
        _ => return None,
    };
    Some(value)
}

impl<'a> ObjectData<'a> {
    /// Renders the handle for display.
    ///
    /// Primitives show their value, strings their text (cut at the configured maximum
    /// length), null references `null`, other objects their address, type handles the type
    /// name and native objects their name. Composite value types show their type name in
    /// braces.
    #[must_use]
    pub fn value_as_string(&self, snapshot: &'a CachedSnapshot) -> String {
        let pointer_size = snapshot.vm().pointer_size;
        match *self.kind() {
            ObjectDataKind::Unknown => "<unknown>".to_string(),
            ObjectDataKind::Value { type_index, data } => {
                primitive_to_string(snapshot, type_index, data)
                    .unwrap_or_else(|| format!("{{{}}}", snapshot.types().name(type_index)))
            }
            ObjectDataKind::Object {
                address,
                type_index,
                data,
            } => {
                if snapshot.well_known().string_type == Some(type_index) {
                    data.read_string(snapshot.vm(), snapshot.config().max_string_length)
                        .map_or_else(|_| "<unreadable string>".to_string(), |text| text.value)
                } else {
                    format_address(address, pointer_size)
                }
            }
            ObjectDataKind::Array { address, .. } => format_address(address, pointer_size),
            ObjectDataKind::BoxedValue { address, .. } => self
                .unboxed(snapshot)
                .map_or_else(|_| format_address(address, pointer_size), |value| {
                    value.value_as_string(snapshot)
                }),
            ObjectDataKind::ReferenceObject { .. } | ObjectDataKind::ReferenceArray { .. } => {
                match self.reference_target() {
                    None => "<unknown>".to_string(),
                    Some(0) => "null".to_string(),
                    Some(target) => {
                        let object = self.deref(snapshot);
                        let is_string = object.type_index().is_some()
                            && object.type_index() == snapshot.well_known().string_type;
                        if is_string {
                            object.value_as_string(snapshot)
                        } else {
                            format_address(target, pointer_size)
                        }
                    }
                }
            }
            ObjectDataKind::Type { type_index } => snapshot.types().name(type_index).to_string(),
            ObjectDataKind::NativeObject { native_index } => snapshot
                .native_objects()
                .name(native_index)
                .unwrap_or("<unknown>")
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory::TRUNCATION_MARKER, test::SnapshotBuilder, CrawlerConfig};

    #[test]
    fn addresses_follow_pointer_width() {
        assert_eq!(format_address(0xABCD, 8), "0x000000000000ABCD");
        assert_eq!(format_address(0xABCD, 4), "0x0000ABCD");
    }

    #[test]
    fn primitives_and_composites() {
        let mut builder = SnapshotBuilder::mono_64();
        let boolean = builder.value_type("System.Boolean", 17);
        let double = builder.value_type("System.Double", 24);
        let vector = builder.value_type("UnityEngine.Vector3", 28);
        let holder = builder.class("Holder", None, 56);
        let flag = builder.instance_field(holder, "flag", 16, boolean);
        let ratio = builder.instance_field(holder, "ratio", 24, double);
        let position = builder.instance_field(holder, "position", 32, vector);
        let address = builder.object(holder, 56);
        builder.write_bytes(address + 16, &[1]);
        builder.write_bytes(address + 24, &0.5f64.to_le_bytes());
        builder.gc_handle(address);
        let snapshot = builder.build();

        let handle = ObjectData::from_managed_pointer(&snapshot, address);
        let field = |field| handle.field(&snapshot, field).unwrap().value_as_string(&snapshot);
        assert_eq!(field(flag), "true");
        assert_eq!(field(ratio), "0.5");
        assert_eq!(field(position), "{UnityEngine.Vector3}");
        assert_eq!(handle.value_as_string(&snapshot), format_address(address, 8));
        assert_eq!(
            ObjectData::type_statics(holder).value_as_string(&snapshot),
            "Holder"
        );
    }

    #[test]
    fn strings_through_references_are_truncated() {
        let mut builder = SnapshotBuilder::mono_64()
            .with_config(CrawlerConfig::default().with_max_string_length(Some(5)));
        let string = builder.string_type();
        let holder = builder.class("Holder", None, 32);
        let short = builder.instance_field(holder, "short", 16, string);
        let long = builder.instance_field(holder, "long", 24, string);
        let address = builder.object(holder, 32);
        let short_text = builder.string("hey");
        let long_text = builder.string("hello world");
        builder.write_pointer(address + 16, short_text);
        builder.write_pointer(address + 24, long_text);
        builder.gc_handle(address);
        let snapshot = builder.build();

        let handle = ObjectData::from_managed_pointer(&snapshot, address);
        let short = handle.field(&snapshot, short).unwrap().value_as_string(&snapshot);
        let long = handle.field(&snapshot, long).unwrap().value_as_string(&snapshot);
        assert_eq!(short, "hey");
        assert_eq!(long, format!("hello{TRUNCATION_MARKER}"));
        assert_eq!(long.chars().count(), 5 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn null_reference() {
        let mut builder = SnapshotBuilder::mono_64();
        let object = builder.class("System.Object", None, 16);
        let holder = builder.class("Holder", None, 24);
        let field = builder.instance_field(holder, "empty", 16, object);
        let address = builder.object(holder, 24);
        builder.gc_handle(address);
        let snapshot = builder.build();

        let handle = ObjectData::from_managed_pointer(&snapshot, address);
        let reference = handle.field(&snapshot, field).unwrap();
        assert_eq!(reference.value_as_string(&snapshot), "null");
        assert_eq!(reference.size(&snapshot), 8);
    }
}

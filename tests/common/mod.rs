//! Snapshot fixtures shared by the integration tests.
//!
//! Builds [`SnapshotData`] for a 64-bit Mono capture with a single garbage collector section.

#![allow(dead_code)]

use memscope::{
    memory::{MemorySection, MemorySectionType},
    snapshot::{SnapshotData, TypeFlags, VirtualMachineInformation},
};

pub const HEAP_START: u64 = 0x7F00_0000_0000;
pub const HEADER: u64 = 16;
const TYPE_INFO_BASE: u64 = 0x0010_0000;
const TYPE_INDEX_BASE: i32 = 500;

pub struct Capture {
    pub data: SnapshotData,
    heap: Vec<u8>,
}

impl Capture {
    pub fn new() -> Self {
        Self {
            data: SnapshotData {
                vm: VirtualMachineInformation::mono_64(),
                ..SnapshotData::default()
            },
            heap: Vec::new(),
        }
    }

    fn logical(row: usize) -> i32 {
        TYPE_INDEX_BASE + row as i32
    }

    pub fn type_info(row: usize) -> u64 {
        TYPE_INFO_BASE + row as u64 * 0x40
    }

    fn add_type(&mut self, name: &str, flags: TypeFlags, base_or_element: i32, size: i32) -> usize {
        let types = &mut self.data.types;
        let row = types.name.len();
        types.flags.push(flags);
        types.base_or_element_type_index.push(base_or_element);
        types.size.push(size);
        types.type_info_address.push(Self::type_info(row));
        types.type_index.push(Self::logical(row));
        types.name.push(name.to_string());
        types.assembly.push("Assembly-CSharp".to_string());
        types.field_indices.push(Vec::new());
        types.static_field_bytes.push(Vec::new());
        row
    }

    pub fn class(&mut self, name: &str, base: Option<usize>, size: i32) -> usize {
        let base = base.map_or(-1, Self::logical);
        self.add_type(name, TypeFlags::empty(), base, size)
    }

    pub fn value_type(&mut self, name: &str, size: i32) -> usize {
        self.add_type(name, TypeFlags::VALUE_TYPE, -1, size)
    }

    pub fn array(&mut self, name: &str, element: usize) -> usize {
        self.add_type(name, TypeFlags::array_of_rank(1), Self::logical(element), 32)
    }

    fn field(&mut self, owner: usize, name: &str, offset: i32, field_type: usize, is_static: bool) -> usize {
        let fields = &mut self.data.fields;
        let field = fields.name.len();
        fields.name.push(name.to_string());
        fields.offset.push(offset);
        fields.type_index.push(Self::logical(field_type));
        fields.is_static.push(is_static);
        self.data.types.field_indices[owner].push(field as i32);
        field
    }

    pub fn instance_field(&mut self, owner: usize, name: &str, offset: i32, field_type: usize) -> usize {
        self.field(owner, name, offset, field_type, false)
    }

    pub fn static_field(&mut self, owner: usize, name: &str, offset: i32, field_type: usize) -> usize {
        self.field(owner, name, offset, field_type, true)
    }

    pub fn static_bytes(&mut self, owner: usize, bytes: Vec<u8>) {
        self.data.types.static_field_bytes[owner] = bytes;
    }

    pub fn object(&mut self, type_row: usize, size: usize) -> u64 {
        let start = self.heap.len().next_multiple_of(8);
        self.heap.resize(start + size.max(8), 0);
        let address = HEAP_START + start as u64;
        self.write(address, Self::type_info(type_row));
        address
    }

    pub fn array_object(&mut self, array_type: usize, elements: &[u64]) -> u64 {
        let address = self.object(array_type, 32 + elements.len() * 8);
        self.write_bytes(address + 24, &(elements.len() as i32).to_le_bytes());
        for (i, &element) in elements.iter().enumerate() {
            self.write(address + 32 + i as u64 * 8, element);
        }
        address
    }

    pub fn write_bytes(&mut self, address: u64, bytes: &[u8]) {
        let offset = (address - HEAP_START) as usize;
        self.heap[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn write(&mut self, address: u64, value: u64) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn gc_handle(&mut self, target: u64) -> usize {
        self.data.gc_handles.target.push(target);
        self.data.gc_handles.target.len() - 1
    }

    pub fn native_type(&mut self, name: &str) -> usize {
        let types = &mut self.data.native_types;
        types.name.push(name.to_string());
        types.native_base_type_array_index.push(-1);
        types.name.len() - 1
    }

    pub fn native_object(&mut self, native_type: usize, name: &str, address: u64, size: u64) -> usize {
        let objects = &mut self.data.native_objects;
        let index = objects.name.len();
        objects.name.push(name.to_string());
        objects.instance_id.push(index as i32 + 1);
        objects.size.push(size);
        objects.native_type_index.push(native_type as i32);
        objects.native_object_address.push(address);
        objects.root_reference_id.push(0);
        index
    }

    pub fn finish(mut self) -> SnapshotData {
        self.data.sections = vec![MemorySection::new(
            HEAP_START,
            self.heap,
            MemorySectionType::GarbageCollector,
        )];
        self.data
    }
}

/// A small scene: a two-node linked list held by two GC handles on its head, a
/// `UnityEngine.Object` shell for one native texture referenced by the head, and a static field
/// holding a string.
pub struct Scene {
    pub data: SnapshotData,
    pub node_type: usize,
    pub holder_type: usize,
    pub string_type: usize,
    pub shell_type: usize,
    pub next_field: usize,
    pub value_field: usize,
    pub title_field: usize,
    pub head: u64,
    pub tail: u64,
    pub shell: u64,
    pub text: u64,
    pub texture: usize,
}

pub fn scene() -> Scene {
    let mut capture = Capture::new();
    let string_type = capture.class("System.String", None, 20);
    let int_ptr = capture.value_type("System.IntPtr", 24);
    let int32 = capture.value_type("System.Int32", 20);
    let bridge = capture.class("UnityEngine.Object", None, 24);
    capture.instance_field(bridge, "m_CachedPtr", 16, int_ptr);
    let shell_type = capture.class("UnityEngine.Texture2D", Some(bridge), 24);

    let node_type = capture.class("Node", None, 40);
    let next_field = capture.instance_field(node_type, "next", 16, node_type);
    let value_field = capture.instance_field(node_type, "value", 24, int32);
    capture.instance_field(node_type, "texture", 32, shell_type);

    let holder_type = capture.class("Holder", None, 16);
    let title_field = capture.static_field(holder_type, "title", 0, string_type);

    let texture_type = capture.native_type("Texture2D");
    let texture = capture.native_object(texture_type, "Wood", 0xAA00, 4096);

    let head = capture.object(node_type, 40);
    let tail = capture.object(node_type, 40);
    let shell = capture.object(shell_type, 24);
    capture.write(shell + 16, 0xAA00);
    capture.write(head + 16, tail);
    capture.write_bytes(head + 24, &7i32.to_le_bytes());
    capture.write(head + 32, shell);
    capture.write_bytes(tail + 24, &9i32.to_le_bytes());

    let text = capture.object(string_type, 20 + 2 * 5 + 2);
    capture.write_bytes(text + 16, &5i32.to_le_bytes());
    let chars: Vec<u8> = "Hello".encode_utf16().flat_map(u16::to_le_bytes).collect();
    capture.write_bytes(text + 20, &chars);
    capture.static_bytes(holder_type, text.to_le_bytes().to_vec());

    capture.gc_handle(head);
    capture.gc_handle(head);

    Scene {
        data: capture.finish(),
        node_type,
        holder_type,
        string_type,
        shell_type,
        next_field,
        value_field,
        title_field,
        head,
        tail,
        shell,
        text,
        texture,
    }
}

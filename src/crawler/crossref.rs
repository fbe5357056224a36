//! Links between managed shells and native objects.
//!
//! Every managed object deriving from the native bridge type stores the address of its native
//! counterpart in a cached pointer field. Resolving that address against the native object
//! table (not the heap) yields the link. The links are collected here and written into the
//! native tables by [`NativeLinks::apply`] once the crawl is complete.

use std::collections::HashMap;

use crate::{
    crawler::{ConnectionKind, ManagedConnection, ManagedData},
    snapshot::{NativeObjects, NativeTypes},
    utils::BitSet,
    CachedSnapshot,
};

/// Native-side back-links found by the cross-reference pass.
#[derive(Debug, Clone, Default)]
pub(crate) struct NativeLinks {
    /// `(native object, managed shell)` pairs.
    shells: Vec<(usize, usize)>,
    /// `(native type, managed type)` pairs found by the name heuristic.
    managed_types: Vec<(usize, usize)>,
}

impl NativeLinks {
    /// Writes the links into the native tables.
    pub(crate) fn apply(self, objects: &mut NativeObjects, types: &mut NativeTypes) {
        for (native, managed) in self.shells {
            objects.set_managed_object_index(native, managed);
            objects.add_ref(native);
        }
        for (native_type, managed_type) in self.managed_types {
            types.set_managed_type_index(native_type, managed_type);
        }
    }
}

/// Links every managed shell in `data` to its native object.
pub(crate) fn resolve(snapshot: &CachedSnapshot, data: &mut ManagedData) -> NativeLinks {
    let mut links = NativeLinks::default();
    let config = snapshot.config();
    if !config.resolve_native_links {
        tracing::debug!("native link resolution disabled");
        return links;
    }

    let well_known = snapshot.well_known();
    let (Some(bridge), Some(cached_ptr)) =
        (well_known.native_bridge_type, well_known.cached_ptr_field)
    else {
        tracing::debug!(
            bridge = %config.native_bridge_type_name,
            field = %config.cached_ptr_field_name,
            "snapshot has no native bridge type"
        );
        return links;
    };
    let Some(offset) = snapshot
        .fields()
        .offset(cached_ptr)
        .ok()
        .and_then(|offset| usize::try_from(offset).ok())
    else {
        return links;
    };

    let types = snapshot.types();
    let mut bridge_types = BitSet::new(types.count());
    for type_index in 0..types.count() {
        if types.is_subclass_of(type_index, bridge) {
            bridge_types.insert(type_index);
        }
    }

    for index in 0..data.objects.len() {
        if data.duplicates.contains(index) {
            continue;
        }
        let info = &data.objects[index];
        if !info
            .type_index
            .is_some_and(|type_index| bridge_types.contains(type_index))
        {
            continue;
        }

        let native_ptr = snapshot
            .sections()
            .find(info.ptr_object)
            .and_then(|object| object.add(offset).read_pointer().ok())
            .unwrap_or(0);

        match snapshot.native_objects().find_by_address(native_ptr) {
            Some(native) => {
                let shell = &mut data.objects[index];
                shell.native_object_index = Some(native);
                shell.ref_count += 1;
                data.connections.push(ManagedConnection {
                    kind: ConnectionKind::NativeToManagedShell,
                    from: native,
                    to: index,
                    field_from: None,
                    array_index_from: None,
                });
                links.shells.push((native, index));
            }
            None => {
                data.diagnostics.shells_without_native_object += 1;
                tracing::debug!(
                    object = info.ptr_object,
                    native_ptr,
                    "managed shell without native object"
                );
            }
        }
    }

    if config.enable_type_name_heuristic {
        links.managed_types = map_native_types(snapshot, &bridge_types);
    }

    tracing::debug!(
        shells = links.shells.len(),
        orphans = data.diagnostics.shells_without_native_object,
        type_links = links.managed_types.len(),
        "native links resolved"
    );
    links
}

/// Pairs native types with bridge-derived managed types of the same short name.
///
/// `UnityEngine.Texture2D` pairs with the native `Texture2D`. Best effort, the first managed
/// type with a given short name wins.
fn map_native_types(snapshot: &CachedSnapshot, bridge_types: &BitSet) -> Vec<(usize, usize)> {
    let types = snapshot.types();
    let mut by_short_name: HashMap<&str, usize> = HashMap::new();
    for type_index in bridge_types.iter() {
        let name = types.name(type_index);
        let short = name.rsplit('.').next().unwrap_or(name);
        by_short_name.entry(short).or_insert(type_index);
    }

    let native_types = snapshot.native_types();
    (0..native_types.count())
        .filter_map(|native_type| {
            let name = native_types.name(native_type)?;
            Some((native_type, *by_short_name.get(name)?))
        })
        .collect()
}

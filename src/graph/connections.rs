//! Incoming and outgoing connections by unified index.

use std::collections::HashMap;

use crate::{crawler::ConnectionKind, graph::UnifiedObject, CachedSnapshot};

/// What refers to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Referrer {
    /// The object with this unified index.
    Object(usize),
    /// The static storage of the type at this row.
    TypeStatics(usize),
}

/// Connection lookups, built once after the crawl.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMaps {
    incoming: HashMap<usize, Vec<Referrer>>,
    outgoing: HashMap<usize, Vec<usize>>,
    type_statics_outgoing: HashMap<usize, Vec<usize>>,
}

impl ConnectionMaps {
    /// Collects the crawled connections and the capture's own connections.
    ///
    /// Capture connections with an index outside the unified space are dropped.
    #[must_use]
    pub fn build(snapshot: &CachedSnapshot) -> Self {
        let unified = snapshot.unified();
        let mut maps = Self::default();

        for connection in snapshot.managed().connections() {
            let Some(to) = unified.from_managed(connection.to) else {
                continue;
            };

            match connection.kind {
                ConnectionKind::TypeStaticToObject => {
                    maps.type_statics_outgoing
                        .entry(connection.from)
                        .or_default()
                        .push(to);
                    maps.incoming
                        .entry(to)
                        .or_default()
                        .push(Referrer::TypeStatics(connection.from));
                }
                ConnectionKind::ObjectToObject | ConnectionKind::NativeToManagedShell => {
                    let from = if connection.kind == ConnectionKind::ObjectToObject {
                        UnifiedObject::Managed(connection.from)
                    } else {
                        UnifiedObject::Native(connection.from)
                    };
                    let Some(from) = unified.index_of(from) else {
                        continue;
                    };
                    maps.link(from, to);
                }
            }
        }

        let mut dropped = 0usize;
        for (from, to) in snapshot.raw_connections().iter() {
            if from < unified.count() && to < unified.count() {
                maps.link(from, to);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "capture connections outside the unified index space");
        }

        maps
    }

    fn link(&mut self, from: usize, to: usize) {
        self.outgoing.entry(from).or_default().push(to);
        self.incoming
            .entry(to)
            .or_default()
            .push(Referrer::Object(from));
    }

    /// Everything referring to the object at `unified`.
    #[must_use]
    pub fn incoming(&self, unified: usize) -> &[Referrer] {
        self.incoming.get(&unified).map_or(&[], Vec::as_slice)
    }

    /// Unified indices of the objects the object at `unified` refers to.
    #[must_use]
    pub fn outgoing(&self, unified: usize) -> &[usize] {
        self.outgoing.get(&unified).map_or(&[], Vec::as_slice)
    }

    /// Unified indices of the objects referenced from the static storage of a type.
    #[must_use]
    pub fn type_statics_outgoing(&self, type_index: usize) -> &[usize] {
        self.type_statics_outgoing
            .get(&type_index)
            .map_or(&[], Vec::as_slice)
    }
}

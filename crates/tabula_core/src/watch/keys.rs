//! Entity kinds and their watchable keys.
//!
//! Every entity kind has a closed key enum. Plain keys are resolved through a
//! static name table; the few parameterized keys (`cellValuesInField:<id>`,
//! `cellValueInField:<id>`) are recognized by prefix.

use std::fmt;

/// The kinds of model entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// The root entity.
    Base,
    /// A table of a base.
    Table,
    /// A field of a table.
    Field,
    /// A view of a table.
    View,
    /// The record container of a table.
    RecordStore,
    /// A record of a table.
    Record,
    /// The user's cursor and selection.
    Cursor,
}

impl EntityKind {
    /// Returns the type name used in debug strings.
    pub const fn name(self) -> &'static str {
        match self {
            EntityKind::Base => "Base",
            EntityKind::Table => "Table",
            EntityKind::Field => "Field",
            EntityKind::View => "View",
            EntityKind::RecordStore => "RecordStore",
            EntityKind::Record => "Record",
            EntityKind::Cursor => "Cursor",
        }
    }

    /// Validates `key` against this kind's allow-list.
    pub fn parse_key(self, key: &str) -> Option<WatchKey> {
        match self {
            EntityKind::Base => lookup(BaseKey::NAMES, key).map(WatchKey::Base),
            EntityKind::Table => lookup(TableKey::NAMES, key).map(WatchKey::Table),
            EntityKind::Field => lookup(FieldKey::NAMES, key).map(WatchKey::Field),
            EntityKind::View => lookup(ViewKey::NAMES, key).map(WatchKey::View),
            EntityKind::RecordStore => RecordStoreKey::parse(key).map(WatchKey::RecordStore),
            EntityKind::Record => RecordKey::parse(key).map(WatchKey::Record),
            EntityKind::Cursor => lookup(CursorKey::NAMES, key).map(WatchKey::Cursor),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn lookup<K: Clone>(table: &[(&str, K)], key: &str) -> Option<K> {
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value.clone())
}

fn name_of<K: PartialEq>(table: &'static [(&'static str, K)], key: &K) -> &'static str {
    table
        .iter()
        .find(|(_, value)| value == key)
        .map(|(name, _)| *name)
        .unwrap_or("?")
}

/// Keys watchable on a [`Base`](crate::Base).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseKey {
    /// The base name.
    Name,
    /// The base color.
    Color,
    /// The table list or order.
    Tables,
    /// The collaborator set.
    Collaborators,
    /// Aggregate: anything structural changed in any table.
    Schema,
}

impl BaseKey {
    const NAMES: &'static [(&'static str, BaseKey)] = &[
        ("name", BaseKey::Name),
        ("color", BaseKey::Color),
        ("tables", BaseKey::Tables),
        ("collaborators", BaseKey::Collaborators),
        ("schema", BaseKey::Schema),
    ];
}

/// Keys watchable on a [`Table`](crate::Table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKey {
    /// The table name.
    Name,
    /// The table description.
    Description,
    /// The primary field id.
    PrimaryField,
    /// The field set.
    Fields,
    /// The view list or order.
    Views,
}

impl TableKey {
    const NAMES: &'static [(&'static str, TableKey)] = &[
        ("name", TableKey::Name),
        ("description", TableKey::Description),
        ("primaryField", TableKey::PrimaryField),
        ("fields", TableKey::Fields),
        ("views", TableKey::Views),
    ];
}

/// Keys watchable on a [`Field`](crate::Field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    /// The field name.
    Name,
    /// The field type.
    Type,
    /// The type-specific options.
    Options,
    /// The field description.
    Description,
}

impl FieldKey {
    const NAMES: &'static [(&'static str, FieldKey)] = &[
        ("name", FieldKey::Name),
        ("type", FieldKey::Type),
        ("options", FieldKey::Options),
        ("description", FieldKey::Description),
    ];
}

/// Keys watchable on a [`View`](crate::View).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKey {
    /// The view name.
    Name,
    /// The view type.
    Type,
}

impl ViewKey {
    const NAMES: &'static [(&'static str, ViewKey)] =
        &[("name", ViewKey::Name), ("type", ViewKey::Type)];
}

/// Keys watchable on a [`RecordStore`](crate::RecordStore).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordStoreKey {
    /// Record membership or any record data changed.
    Records,
    /// Record membership changed.
    RecordIds,
    /// Any cell value changed.
    CellValues,
    /// A cell value in the given field changed.
    CellValuesInField(String),
    /// The loaded state changed.
    IsDataLoaded,
}

impl RecordStoreKey {
    const NAMES: &'static [(&'static str, RecordStoreKey)] = &[
        ("records", RecordStoreKey::Records),
        ("recordIds", RecordStoreKey::RecordIds),
        ("cellValues", RecordStoreKey::CellValues),
        ("isDataLoaded", RecordStoreKey::IsDataLoaded),
    ];

    /// Prefix of the per-field cell values key.
    pub const IN_FIELD_PREFIX: &'static str = "cellValuesInField:";

    fn parse(key: &str) -> Option<Self> {
        match key.strip_prefix(Self::IN_FIELD_PREFIX) {
            Some(field_id) if !field_id.is_empty() => {
                Some(RecordStoreKey::CellValuesInField(field_id.to_string()))
            }
            Some(_) => None,
            None => lookup(Self::NAMES, key),
        }
    }
}

/// Keys watchable on a [`Record`](crate::Record).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// The value of the table's primary field.
    PrimaryCellValue,
    /// Any cell value.
    CellValues,
    /// The cell value in the given field.
    CellValueInField(String),
    /// The number of comments.
    CommentCount,
}

impl RecordKey {
    const NAMES: &'static [(&'static str, RecordKey)] = &[
        ("primaryCellValue", RecordKey::PrimaryCellValue),
        ("cellValues", RecordKey::CellValues),
        ("commentCount", RecordKey::CommentCount),
    ];

    /// Prefix of the per-field cell value key.
    pub const IN_FIELD_PREFIX: &'static str = "cellValueInField:";

    fn parse(key: &str) -> Option<Self> {
        match key.strip_prefix(Self::IN_FIELD_PREFIX) {
            Some(field_id) if !field_id.is_empty() => {
                Some(RecordKey::CellValueInField(field_id.to_string()))
            }
            Some(_) => None,
            None => lookup(Self::NAMES, key),
        }
    }
}

/// Keys watchable on the [`Cursor`](crate::Cursor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorKey {
    /// The active table id.
    ActiveTableId,
    /// The active view id.
    ActiveViewId,
    /// The selected record ids.
    SelectedRecordIds,
    /// The selected field ids.
    SelectedFieldIds,
    /// The loaded state changed.
    IsDataLoaded,
}

impl CursorKey {
    const NAMES: &'static [(&'static str, CursorKey)] = &[
        ("activeTableId", CursorKey::ActiveTableId),
        ("activeViewId", CursorKey::ActiveViewId),
        ("selectedRecordIds", CursorKey::SelectedRecordIds),
        ("selectedFieldIds", CursorKey::SelectedFieldIds),
        ("isDataLoaded", CursorKey::IsDataLoaded),
    ];
}

/// A validated watch key of some entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKey {
    /// A base key.
    Base(BaseKey),
    /// A table key.
    Table(TableKey),
    /// A field key.
    Field(FieldKey),
    /// A view key.
    View(ViewKey),
    /// A record store key.
    RecordStore(RecordStoreKey),
    /// A record key.
    Record(RecordKey),
    /// A cursor key.
    Cursor(CursorKey),
}

impl WatchKey {
    /// Returns the entity kind this key belongs to.
    pub fn kind(&self) -> EntityKind {
        match self {
            WatchKey::Base(_) => EntityKind::Base,
            WatchKey::Table(_) => EntityKind::Table,
            WatchKey::Field(_) => EntityKind::Field,
            WatchKey::View(_) => EntityKind::View,
            WatchKey::RecordStore(_) => EntityKind::RecordStore,
            WatchKey::Record(_) => EntityKind::Record,
            WatchKey::Cursor(_) => EntityKind::Cursor,
        }
    }

    /// Returns the public name of the key, e.g. `cellValuesInField:fld1`.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchKey::Base(key) => f.write_str(name_of(BaseKey::NAMES, key)),
            WatchKey::Table(key) => f.write_str(name_of(TableKey::NAMES, key)),
            WatchKey::Field(key) => f.write_str(name_of(FieldKey::NAMES, key)),
            WatchKey::View(key) => f.write_str(name_of(ViewKey::NAMES, key)),
            WatchKey::RecordStore(RecordStoreKey::CellValuesInField(field_id)) => {
                write!(f, "{}{}", RecordStoreKey::IN_FIELD_PREFIX, field_id)
            }
            WatchKey::RecordStore(key) => f.write_str(name_of(RecordStoreKey::NAMES, key)),
            WatchKey::Record(RecordKey::CellValueInField(field_id)) => {
                write!(f, "{}{}", RecordKey::IN_FIELD_PREFIX, field_id)
            }
            WatchKey::Record(key) => f.write_str(name_of(RecordKey::NAMES, key)),
            WatchKey::Cursor(key) => f.write_str(name_of(CursorKey::NAMES, key)),
        }
    }
}

impl From<BaseKey> for WatchKey {
    fn from(key: BaseKey) -> Self {
        WatchKey::Base(key)
    }
}

impl From<TableKey> for WatchKey {
    fn from(key: TableKey) -> Self {
        WatchKey::Table(key)
    }
}

impl From<FieldKey> for WatchKey {
    fn from(key: FieldKey) -> Self {
        WatchKey::Field(key)
    }
}

impl From<ViewKey> for WatchKey {
    fn from(key: ViewKey) -> Self {
        WatchKey::View(key)
    }
}

impl From<RecordStoreKey> for WatchKey {
    fn from(key: RecordStoreKey) -> Self {
        WatchKey::RecordStore(key)
    }
}

impl From<RecordKey> for WatchKey {
    fn from(key: RecordKey) -> Self {
        WatchKey::Record(key)
    }
}

impl From<CursorKey> for WatchKey {
    fn from(key: CursorKey) -> Self {
        WatchKey::Cursor(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys_round_trip_through_names() {
        for kind in [EntityKind::Base, EntityKind::Table, EntityKind::Cursor] {
            for name in ["name", "tables", "fields", "activeTableId", "schema"] {
                if let Some(key) = kind.parse_key(name) {
                    assert_eq!(key.to_string(), name);
                    assert_eq!(key.kind(), kind);
                }
            }
        }
    }

    #[test]
    fn keys_are_scoped_to_their_kind() {
        assert!(EntityKind::Base.parse_key("schema").is_some());
        assert!(EntityKind::Table.parse_key("schema").is_none());
        assert!(EntityKind::Field.parse_key("views").is_none());
        assert!(EntityKind::Cursor.parse_key("isDataLoaded").is_some());
        assert!(EntityKind::Table.parse_key("isDataLoaded").is_none());
    }

    #[test]
    fn parameterized_keys() {
        let key = EntityKind::RecordStore
            .parse_key("cellValuesInField:fld1")
            .unwrap();
        assert_eq!(
            key,
            WatchKey::RecordStore(RecordStoreKey::CellValuesInField("fld1".into()))
        );
        assert_eq!(key.to_string(), "cellValuesInField:fld1");

        let key = EntityKind::Record.parse_key("cellValueInField:fld2").unwrap();
        assert_eq!(key.to_string(), "cellValueInField:fld2");

        assert!(EntityKind::RecordStore.parse_key("cellValuesInField:").is_none());
        assert!(EntityKind::Record.parse_key("cellValuesInField:fld1").is_none());
    }

    #[test]
    fn kind_display() {
        assert_eq!(EntityKind::RecordStore.to_string(), "RecordStore");
    }
}

//! Index data sources.
//!
//! A `DataSource` describes how the engine obtains the rows of one physical
//! index: the selected columns, their attribute types, the row-selection
//! predicates and any statements that run before the read. It stays
//! structured until rendering so variant handlers can rewrite table names
//! and predicates without string surgery.

use std::fmt;

use polydex_core::util::packing::packed_column;
use polydex_core::{FieldKind, IndexMode, TypeRegistry, partition_id};
use serde::{Deserialize, Serialize};

use crate::fields::{CLASS_NAME_FIELD, FieldDescriptor};

/// Column holding the global document id.
pub const ID_COLUMN: &str = "id";
/// Attribute holding the local row id.
pub const LOCAL_ID_ATTR: &str = "_id";
/// Attribute holding the base type's partition id.
pub const BASE_ID_ATTR: &str = "_baseid";
/// Attribute holding the concrete type's partition id.
pub const CLASS_ID_ATTR: &str = "_classid";
/// Attribute flagging rows written since the last delta refresh.
pub const DIRTY_ATTR: &str = "_dirty";
/// Column holding a row's partition on partitioned base types.
pub const PARTITION_COLUMN: &str = "partition_id";

/// Engine attribute type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    /// Unsigned 32-bit integer.
    Uint,
    /// Boolean.
    Bool,
    /// UNIX timestamp.
    Timestamp,
}

impl AttrType {
    /// Tag as written in the engine artifact.
    pub fn as_str(self) -> &'static str {
        match self {
            AttrType::Uint => "uint",
            AttrType::Bool => "bool",
            AttrType::Timestamp => "timestamp",
        }
    }

    /// Parse an artifact tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "uint" => Some(AttrType::Uint),
            "bool" => Some(AttrType::Bool),
            "timestamp" => Some(AttrType::Timestamp),
            _ => None,
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a selected column is computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnExpr {
    /// `(partition << 32) | table.ID`
    GlobalId {
        /// Partition id of the base type.
        partition: u32,
        /// Base table.
        table: String,
    },
    /// A plain column.
    Field {
        /// Owning table.
        table: String,
        /// Column name.
        column: String,
    },
    /// A date column converted to a UNIX timestamp.
    UnixTimestamp {
        /// Owning table.
        table: String,
        /// Column name.
        column: String,
    },
    /// CRC32 of a string column.
    Crc32 {
        /// Owning table.
        table: String,
        /// Column name.
        column: String,
    },
    /// First four bytes of a string column packed into an integer.
    Packed {
        /// Owning table.
        table: String,
        /// Column name.
        column: String,
    },
    /// A numeric constant.
    Constant(u64),
    /// A verbatim expression.
    Expression(String),
}

impl ColumnExpr {
    fn tables_mut(&mut self) -> Option<&mut String> {
        match self {
            ColumnExpr::GlobalId { table, .. }
            | ColumnExpr::Field { table, .. }
            | ColumnExpr::UnixTimestamp { table, .. }
            | ColumnExpr::Crc32 { table, .. }
            | ColumnExpr::Packed { table, .. } => Some(table),
            ColumnExpr::Constant(_) | ColumnExpr::Expression(_) => None,
        }
    }

    /// SQL text of the expression.
    pub fn to_sql(&self) -> String {
        match self {
            ColumnExpr::GlobalId { partition, table } => {
                format!("({partition}<<32)|{}.`ID`", quote(table))
            }
            ColumnExpr::Field { table, column } => qualified(table, column),
            ColumnExpr::UnixTimestamp { table, column } => {
                format!("UNIX_TIMESTAMP({})", qualified(table, column))
            }
            ColumnExpr::Crc32 { table, column } => format!("CRC32({})", qualified(table, column)),
            ColumnExpr::Packed { table, column } => {
                let col = qualified(table, column);
                format!(
                    "(ascii(substr({col},1,1)) << 24) | (ascii(substr({col},2,1)) << 16) | (ascii(substr({col},3,1)) << 8) | ascii(substr({col},4,1))"
                )
            }
            ColumnExpr::Constant(value) => value.to_string(),
            ColumnExpr::Expression(expr) => expr.clone(),
        }
    }
}

/// One selected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Output alias.
    pub alias: String,
    /// Value expression.
    pub expr: ColumnExpr,
}

/// One typed attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Column alias the attribute reads.
    pub name: String,
    /// Attribute type.
    pub attr_type: AttrType,
}

/// A multi-value attribute populated by its own query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiValue {
    /// Attribute name.
    pub name: String,
    /// Query returning `(id, <name>)` pairs.
    pub query: String,
}

/// A row-selection predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// `table.class_name IN (...)`
    TypeIn {
        /// Base table holding the type column.
        table: String,
        /// Accepted concrete type names.
        types: Vec<String>,
    },
    /// `table.column = 0|1`
    FlagEquals {
        /// Table holding the flag.
        table: String,
        /// Flag column.
        column: String,
        /// Required value.
        value: bool,
    },
    /// Storage-level partition scoping, `table.column = partition`.
    PartitionScoped {
        /// Table holding the partition column.
        table: String,
        /// Partition column.
        column: String,
        /// Partition the storage layer scopes to.
        partition: u32,
    },
    /// A verbatim condition.
    Raw(String),
}

impl Predicate {
    /// SQL text of the predicate.
    pub fn to_sql(&self) -> String {
        match self {
            Predicate::TypeIn { table, types } => {
                format!("{} IN ({})", qualified(table, CLASS_NAME_FIELD), quote_list(types))
            }
            Predicate::FlagEquals {
                table,
                column,
                value,
            } => format!("{} = {}", qualified(table, column), u8::from(*value)),
            Predicate::PartitionScoped {
                table,
                column,
                partition,
            } => format!("{} = {partition}", qualified(table, column)),
            Predicate::Raw(sql) => sql.clone(),
        }
    }

    fn table_mut(&mut self) -> Option<&mut String> {
        match self {
            Predicate::TypeIn { table, .. }
            | Predicate::FlagEquals { table, .. }
            | Predicate::PartitionScoped { table, .. } => Some(table),
            Predicate::Raw(_) => None,
        }
    }
}

/// A statement executed before the rows are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreQuery {
    /// Mark every row of the given types as folded into the primary index.
    ClearStaleFlag {
        /// Table holding the flag column.
        flag_table: String,
        /// Flag column.
        column: String,
        /// Base table holding the type column.
        base_table: String,
        /// Concrete types whose rows are marked.
        types: Vec<String>,
    },
    /// A verbatim statement.
    Raw(String),
}

impl PreQuery {
    /// SQL text of the statement.
    pub fn to_sql(&self) -> String {
        match self {
            PreQuery::ClearStaleFlag {
                flag_table,
                column,
                base_table,
                types,
            } => {
                let join = if flag_table == base_table {
                    String::new()
                } else {
                    format!(
                        " LEFT JOIN {} ON {}.`ID` = {}.`ID`",
                        quote(base_table),
                        quote(flag_table),
                        quote(base_table)
                    )
                };
                format!(
                    "UPDATE {}{join} SET {} = 1 WHERE ({} IN ({}))",
                    quote(flag_table),
                    qualified(flag_table, column),
                    qualified(base_table, CLASS_NAME_FIELD),
                    quote_list(types)
                )
            }
            PreQuery::Raw(sql) => sql.clone(),
        }
    }
}

/// Row source of one physical index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    /// How the engine reads rows.
    pub mode: IndexMode,
    /// Table the query selects from.
    pub base_table: String,
    /// Table holding the stale flag column, if the index has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_table: Option<String>,
    /// Ancestor tables joined on `ID`.
    pub joins: Vec<String>,
    /// Selected columns, in order.
    pub columns: Vec<Column>,
    /// Typed attributes, in order.
    pub attributes: Vec<Attribute>,
    /// Multi-value attributes.
    pub multi_values: Vec<MultiValue>,
    /// Row-selection predicates, combined with AND.
    pub selection: Vec<Predicate>,
    /// Statements run before the read.
    pub pre_queries: Vec<PreQuery>,
}

impl DataSource {
    /// Build the source of an index rooted at `base` with the given members
    /// and field schema.
    pub fn build(
        registry: &TypeRegistry,
        base: &str,
        members: &[String],
        fields: &[FieldDescriptor],
    ) -> Self {
        let root = registry
            .base_type(base)
            .map(|def| def.name.clone())
            .unwrap_or_else(|| base.to_string());
        let table_of = |type_name: &str| {
            registry
                .get(type_name)
                .map(|def| def.table_name().to_string())
                .unwrap_or_else(|| type_name.to_string())
        };
        let base_table = table_of(&root);
        let flag_table = registry
            .declared_base(base)
            .map(|def| def.table_name().to_string());
        let joins = registry
            .ancestry(base)
            .into_iter()
            .skip(1)
            .filter(|def| def.storage)
            .map(|def| def.table_name().to_string())
            .collect();

        let mut columns = vec![
            Column {
                alias: ID_COLUMN.into(),
                expr: ColumnExpr::GlobalId {
                    partition: partition_id(&root),
                    table: base_table.clone(),
                },
            },
            Column {
                alias: LOCAL_ID_ATTR.into(),
                expr: ColumnExpr::Field {
                    table: base_table.clone(),
                    column: "ID".into(),
                },
            },
            Column {
                alias: BASE_ID_ATTR.into(),
                expr: ColumnExpr::Constant(u64::from(partition_id(&root))),
            },
            Column {
                alias: CLASS_ID_ATTR.into(),
                expr: ColumnExpr::Crc32 {
                    table: base_table.clone(),
                    column: CLASS_NAME_FIELD.into(),
                },
            },
            Column {
                alias: DIRTY_ATTR.into(),
                expr: ColumnExpr::Constant(0),
            },
        ];
        let mut attributes = vec![
            Attribute::new(LOCAL_ID_ATTR, AttrType::Uint),
            Attribute::new(BASE_ID_ATTR, AttrType::Uint),
            Attribute::new(CLASS_ID_ATTR, AttrType::Uint),
            Attribute::new(DIRTY_ATTR, AttrType::Bool),
        ];

        for field in fields {
            let table = table_of(&field.owning_type);
            let column = field.name.clone();
            let plain = ColumnExpr::Field {
                table: table.clone(),
                column: column.clone(),
            };
            let (expr, attr_type) = match field.kind {
                FieldKind::Text | FieldKind::EnumeratedText => (plain, None),
                FieldKind::Boolean => (plain, Some(AttrType::Bool)),
                FieldKind::Integer => (plain, Some(AttrType::Uint)),
                FieldKind::Timestamp => (
                    ColumnExpr::UnixTimestamp {
                        table: table.clone(),
                        column: column.clone(),
                    },
                    Some(AttrType::Timestamp),
                ),
                FieldKind::Ordinal => (
                    ColumnExpr::Crc32 {
                        table: table.clone(),
                        column: column.clone(),
                    },
                    Some(AttrType::Uint),
                ),
                FieldKind::Custom => (
                    ColumnExpr::Expression(field.expression.clone().unwrap_or_else(|| "0".into())),
                    Some(AttrType::Uint),
                ),
            };
            columns.push(Column {
                alias: field.name.clone(),
                expr,
            });
            if let Some(attr_type) = attr_type
                && field.filterable
            {
                attributes.push(Attribute::new(&field.name, attr_type));
            }
            if field.needs_packed_key() {
                let packed = packed_column(&field.name);
                columns.push(Column {
                    alias: packed.clone(),
                    expr: ColumnExpr::Packed { table, column },
                });
                attributes.push(Attribute::new(packed, AttrType::Uint));
            }
        }

        let mut ordered_members: Vec<String> = members.to_vec();
        ordered_members.sort_by_key(|name| registry.position(name).unwrap_or(usize::MAX));

        Self {
            mode: registry.index_mode(base),
            multi_values: multi_values(registry, base, &root),
            selection: vec![Predicate::TypeIn {
                table: base_table.clone(),
                types: ordered_members,
            }],
            base_table,
            flag_table,
            joins,
            columns,
            attributes,
            pre_queries: Vec::new(),
        }
    }

    /// Rename every table reference through `rename`.
    pub fn rename_tables(&mut self, rename: impl Fn(&str) -> String) {
        self.base_table = rename(&self.base_table);
        if let Some(flag_table) = &mut self.flag_table {
            *flag_table = rename(flag_table);
        }
        for join in &mut self.joins {
            *join = rename(join);
        }
        for column in &mut self.columns {
            if let Some(table) = column.expr.tables_mut() {
                *table = rename(table);
            }
        }
        for predicate in &mut self.selection {
            if let Some(table) = predicate.table_mut() {
                *table = rename(table);
            }
        }
        for pre in &mut self.pre_queries {
            if let PreQuery::ClearStaleFlag {
                flag_table,
                base_table,
                ..
            } = pre
            {
                *flag_table = rename(flag_table);
                *base_table = rename(base_table);
            }
        }
    }

    /// Whether an attribute with this name exists.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// The rendered row query.
    pub fn query(&self) -> String {
        let select = self
            .columns
            .iter()
            .map(|c| format!("{} AS {}", c.expr.to_sql(), quote(&c.alias)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("SELECT {select} FROM {}", quote(&self.base_table));
        for join in &self.joins {
            sql.push_str(&format!(
                " LEFT JOIN {} ON {}.`ID` = {}.`ID`",
                quote(join),
                quote(join),
                quote(&self.base_table)
            ));
        }
        if !self.selection.is_empty() {
            let conditions = self
                .selection
                .iter()
                .map(|p| format!("({})", p.to_sql()))
                .collect::<Vec<_>>()
                .join(" AND ");
            sql.push_str(" WHERE ");
            sql.push_str(&conditions);
        }
        sql
    }
}

impl Attribute {
    /// Create an attribute.
    pub fn new(name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }
}

fn multi_values(registry: &TypeRegistry, base: &str, root: &str) -> Vec<MultiValue> {
    let Some(settings) = registry.effective_settings(base) else {
        return Vec::new();
    };

    let all = settings.filterable_many_many.iter().any(|n| n == "*");
    let partition = partition_id(root);
    let mut out: Vec<MultiValue> = registry
        .ancestry(base)
        .into_iter()
        .flat_map(|d| d.many_many.iter())
        .filter(|(name, _)| all || settings.filterable_many_many.contains(name))
        .map(|(name, rel)| MultiValue {
            name: name.clone(),
            query: format!(
                "SELECT ({partition}<<32)|{} AS `id`, {} AS {} FROM {}",
                qualified(&rel.join_table, &rel.parent_field),
                qualified(&rel.join_table, &rel.component_field),
                quote(name),
                quote(&rel.join_table)
            ),
        })
        .collect();
    out.extend(settings.extra_many_many.iter().map(|(name, query)| MultiValue {
        name: name.clone(),
        query: query.clone(),
    }));
    out
}

fn quote(ident: &str) -> String {
    format!("`{ident}`")
}

fn qualified(table: &str, column: &str) -> String {
    format!("{}.{}", quote(table), quote(column))
}

fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(",")
}

// ============================================================================
// Tests
// ============================================================================

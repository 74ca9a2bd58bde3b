//! Derive macro for table models.
//!
//! This crate provides `#[derive(Model)]`, which builds the
//! `tessera_core::schema::TableMeta` of a struct once and exposes it through
//! the `tessera_core::schema::Model` trait.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, LitInt, LitStr, Meta, Type,
};

/// Derives `Model` for a struct with named fields.
///
/// # Struct Attributes
///
/// - `#[table(name = "Employee")]` - SQL table name (defaults to the struct name)
/// - `#[table(database = "Main", schema = "dbo")]` - Qualifiers
/// - `#[table(description = "...")]` - Table description
/// - `#[index(name = "byName", columns = "name, age desc")]` - An index;
///   repeatable
///
/// # Field Attributes
///
/// Every field is a column unless it carries a relation attribute.
///
/// - `#[column(name = "company_id")]` - Physical column name
/// - `#[column(primary_key = 1)]` - Position in the primary key
/// - `#[column(auto_increment)]` - Database generated value
/// - `#[column(nullable)]` - Accepts NULL (implied by `Option<T>`)
/// - `#[column(description = "...")]` - Column description
/// - `#[column(text)]`, `#[column(string = 100)]`, `#[column(string_max)]`,
///   `#[column(decimal(precision = 18, digits = 4))]`, `#[column(binary = 16)]`,
///   `#[column(binary_max)]` - Explicit SQL type
/// - `#[foreign_key(columns = "companyId")]` - A foreign key over the listed
///   column fields; the target is the model inside the field type
/// - `#[foreign_key_target(foreign_key = "company")]` - The rows of the model
///   inside the field type whose foreign key `company` points here
#[proc_macro_derive(Model, attributes(table, index, column, foreign_key, foreign_key_target))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_model_impl(&input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_model_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Model derive does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Model derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Model derive only supports structs",
            ));
        }
    };

    let table = parse_table_attrs(&input.attrs, struct_name)?;

    let mut columns = Vec::new();
    let mut foreign_keys = Vec::new();
    let mut foreign_key_targets = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };
        match parse_field(field_name, &field.ty, &field.attrs)? {
            FieldKind::Column(info) => columns.push(column_tokens(&info)),
            FieldKind::ForeignKey(info) => foreign_keys.push(foreign_key_tokens(&info)),
            FieldKind::ForeignKeyTarget(info) => {
                foreign_key_targets.push(foreign_key_target_tokens(&info));
            }
        }
    }

    let name = &table.name;
    let mut qualifiers = Vec::new();
    if let Some(database) = &table.database {
        qualifiers.push(quote! { .database(#database) });
    }
    if let Some(schema) = &table.schema {
        qualifiers.push(quote! { .schema(#schema) });
    }
    if let Some(description) = &table.description {
        qualifiers.push(quote! { .description(#description) });
    }
    let indexes = table.indexes.iter().map(|index| {
        let index_name = &index.name;
        let entries = index.columns.iter().map(|(key, desc)| {
            let order = if *desc {
                quote! { ::tessera_core::query::OrderDirection::Desc }
            } else {
                quote! { ::tessera_core::query::OrderDirection::Asc }
            };
            quote! { (#key, #order) }
        });
        quote! { .index(#index_name, &[#(#entries),*]) }
    });

    Ok(quote! {
        impl ::tessera_core::schema::Model for #struct_name {
            fn table_meta() -> &'static ::tessera_core::schema::TableMeta {
                static META: ::std::sync::OnceLock<::tessera_core::schema::TableMeta> =
                    ::std::sync::OnceLock::new();
                META.get_or_init(|| {
                    ::tessera_core::schema::TableMeta::builder(#name)
                        #(#qualifiers)*
                        #(.column(#columns))*
                        #(.foreign_key(#foreign_keys))*
                        #(.foreign_key_target(#foreign_key_targets))*
                        #(#indexes)*
                        .build()
                })
            }
        }
    })
}

struct TableAttrs {
    name: String,
    database: Option<String>,
    schema: Option<String>,
    description: Option<String>,
    indexes: Vec<IndexAttrs>,
}

struct IndexAttrs {
    name: String,
    columns: Vec<(String, bool)>,
}

enum SqlType {
    Text,
    String(Option<u32>),
    StringMax,
    Decimal(u32, Option<u32>),
    Binary(Option<u32>),
    BinaryMax,
}

struct ColumnInfo {
    key: String,
    ty: Type,
    name: Option<String>,
    description: Option<String>,
    primary_key: Option<u32>,
    auto_increment: bool,
    nullable: bool,
    sql_type: Option<SqlType>,
}

struct ForeignKeyInfo {
    key: String,
    ty: Type,
    columns: Vec<String>,
    description: Option<String>,
}

struct ForeignKeyTargetInfo {
    key: String,
    ty: Type,
    foreign_key: String,
    description: Option<String>,
}

enum FieldKind {
    Column(ColumnInfo),
    ForeignKey(ForeignKeyInfo),
    ForeignKeyTarget(ForeignKeyTargetInfo),
}

fn parse_table_attrs(attrs: &[Attribute], struct_name: &Ident) -> syn::Result<TableAttrs> {
    let mut table = TableAttrs {
        name: struct_name.to_string(),
        database: None,
        schema: None,
        description: None,
        indexes: Vec::new(),
    };

    for attr in attrs {
        if attr.path().is_ident("table") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    table.name = meta.value()?.parse::<LitStr>()?.value();
                } else if meta.path.is_ident("database") {
                    table.database = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("schema") {
                    table.schema = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("description") {
                    table.description = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    return Err(meta.error("unknown table attribute"));
                }
                Ok(())
            })?;
        } else if attr.path().is_ident("index") {
            let mut name = None;
            let mut columns = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    name = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("columns") {
                    let lit = meta.value()?.parse::<LitStr>()?;
                    columns = Some(parse_index_columns(&lit)?);
                } else {
                    return Err(meta.error("unknown index attribute"));
                }
                Ok(())
            })?;
            match (name, columns) {
                (Some(name), Some(columns)) => table.indexes.push(IndexAttrs { name, columns }),
                _ => {
                    return Err(syn::Error::new_spanned(
                        attr,
                        "index requires `name` and `columns`",
                    ));
                }
            }
        }
    }

    Ok(table)
}

fn parse_index_columns(lit: &LitStr) -> syn::Result<Vec<(String, bool)>> {
    let value = lit.value();
    let mut columns = Vec::new();
    for part in split_list(&value) {
        let mut words = part.split_whitespace();
        let key = words.next().unwrap_or_default().to_string();
        let desc = match words.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(_) => return Err(syn::Error::new_spanned(lit, "expected `asc` or `desc`")),
        };
        columns.push((key, desc));
    }
    if columns.is_empty() {
        return Err(syn::Error::new_spanned(lit, "index needs at least one column"));
    }
    Ok(columns)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_field(field_name: &Ident, ty: &Type, attrs: &[Attribute]) -> syn::Result<FieldKind> {
    let key = field_name.to_string();

    for attr in attrs {
        if attr.path().is_ident("foreign_key") {
            let mut info = ForeignKeyInfo {
                key: key.clone(),
                ty: ty.clone(),
                columns: Vec::new(),
                description: None,
            };
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("columns") {
                    info.columns = split_list(&meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("description") {
                    info.description = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    return Err(meta.error("unknown foreign_key attribute"));
                }
                Ok(())
            })?;
            if info.columns.is_empty() {
                return Err(syn::Error::new_spanned(attr, "foreign_key requires `columns`"));
            }
            return Ok(FieldKind::ForeignKey(info));
        }

        if attr.path().is_ident("foreign_key_target") {
            let mut foreign_key = None;
            let mut description = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("foreign_key") {
                    foreign_key = Some(meta.value()?.parse::<LitStr>()?.value());
                } else if meta.path.is_ident("description") {
                    description = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    return Err(meta.error("unknown foreign_key_target attribute"));
                }
                Ok(())
            })?;
            let Some(foreign_key) = foreign_key else {
                return Err(syn::Error::new_spanned(
                    attr,
                    "foreign_key_target requires `foreign_key`",
                ));
            };
            return Ok(FieldKind::ForeignKeyTarget(ForeignKeyTargetInfo {
                key,
                ty: ty.clone(),
                foreign_key,
                description,
            }));
        }
    }

    let mut info = ColumnInfo {
        key,
        ty: ty.clone(),
        name: None,
        description: None,
        primary_key: None,
        auto_increment: false,
        nullable: false,
        sql_type: None,
    };

    for attr in attrs {
        if !attr.path().is_ident("column") {
            continue;
        }
        // Handle empty attribute like #[column]
        if matches!(attr.meta, Meta::Path(_)) {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                info.name = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("description") {
                info.description = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("primary_key") {
                info.primary_key = Some(meta.value()?.parse::<LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("auto_increment") {
                info.auto_increment = true;
            } else if meta.path.is_ident("nullable") {
                info.nullable = true;
            } else if meta.path.is_ident("text") {
                info.sql_type = Some(SqlType::Text);
            } else if meta.path.is_ident("string") {
                let length = if meta.input.peek(syn::Token![=]) {
                    Some(meta.value()?.parse::<LitInt>()?.base10_parse()?)
                } else {
                    None
                };
                info.sql_type = Some(SqlType::String(length));
            } else if meta.path.is_ident("string_max") {
                info.sql_type = Some(SqlType::StringMax);
            } else if meta.path.is_ident("binary") {
                let length = if meta.input.peek(syn::Token![=]) {
                    Some(meta.value()?.parse::<LitInt>()?.base10_parse()?)
                } else {
                    None
                };
                info.sql_type = Some(SqlType::Binary(length));
            } else if meta.path.is_ident("binary_max") {
                info.sql_type = Some(SqlType::BinaryMax);
            } else if meta.path.is_ident("decimal") {
                let mut precision = None;
                let mut digits = None;
                meta.parse_nested_meta(|inner| {
                    if inner.path.is_ident("precision") {
                        precision = Some(inner.value()?.parse::<LitInt>()?.base10_parse()?);
                    } else if inner.path.is_ident("digits") {
                        digits = Some(inner.value()?.parse::<LitInt>()?.base10_parse()?);
                    } else {
                        return Err(inner.error("expected `precision` or `digits`"));
                    }
                    Ok(())
                })?;
                let Some(precision) = precision else {
                    return Err(meta.error("decimal requires `precision`"));
                };
                info.sql_type = Some(SqlType::Decimal(precision, digits));
            } else {
                return Err(meta.error("unknown column attribute"));
            }
            Ok(())
        })?;
    }

    Ok(FieldKind::Column(info))
}

fn column_tokens(info: &ColumnInfo) -> TokenStream2 {
    let key = &info.key;
    let ty = &info.ty;
    let explicit_nullable = info.nullable;

    let mut chain = vec![quote! {
        .nullable(#explicit_nullable || <#ty as ::tessera_core::schema::ColumnValue>::NULLABLE)
    }];
    if let Some(name) = &info.name {
        chain.push(quote! { .name(#name) });
    }
    if let Some(description) = &info.description {
        chain.push(quote! { .description(#description) });
    }
    if let Some(ordinal) = info.primary_key {
        chain.push(quote! { .primary_key(#ordinal) });
    }
    if info.auto_increment {
        chain.push(quote! { .auto_increment() });
    }
    if let Some(sql_type) = &info.sql_type {
        let data_type = match sql_type {
            SqlType::Text => quote! { ::tessera_core::schema::DataType::Text },
            SqlType::String(None) => quote! { ::tessera_core::schema::DataType::String(None) },
            SqlType::String(Some(n)) => quote! {
                ::tessera_core::schema::DataType::String(Some(
                    ::tessera_core::schema::Length::Fixed(#n)
                ))
            },
            SqlType::StringMax => quote! {
                ::tessera_core::schema::DataType::String(Some(::tessera_core::schema::Length::Max))
            },
            SqlType::Decimal(precision, digits) => {
                let digits = match digits {
                    Some(d) => quote! { Some(#d) },
                    None => quote! { None },
                };
                quote! {
                    ::tessera_core::schema::DataType::Decimal {
                        precision: #precision,
                        digits: #digits,
                    }
                }
            }
            SqlType::Binary(None) => quote! { ::tessera_core::schema::DataType::Binary(None) },
            SqlType::Binary(Some(n)) => quote! {
                ::tessera_core::schema::DataType::Binary(Some(
                    ::tessera_core::schema::Length::Fixed(#n)
                ))
            },
            SqlType::BinaryMax => quote! {
                ::tessera_core::schema::DataType::Binary(Some(::tessera_core::schema::Length::Max))
            },
        };
        chain.push(quote! { .data_type(#data_type) });
    }

    quote! {
        ::tessera_core::schema::ColumnMeta::new(
            #key,
            <#ty as ::tessera_core::schema::ColumnValue>::VALUE_TYPE,
        )
        #(#chain)*
    }
}

fn foreign_key_tokens(info: &ForeignKeyInfo) -> TokenStream2 {
    let key = &info.key;
    let ty = &info.ty;
    let columns = &info.columns;
    let description = info
        .description
        .as_ref()
        .map(|d| quote! { .description(#d) });
    quote! {
        ::tessera_core::schema::ForeignKeyMeta::new(
            #key,
            &[#(#columns),*],
            ::tessera_core::schema::ModelRef::of::<
                <#ty as ::tessera_core::schema::Related>::Target
            >(),
        )
        #description
    }
}

fn foreign_key_target_tokens(info: &ForeignKeyTargetInfo) -> TokenStream2 {
    let key = &info.key;
    let ty = &info.ty;
    let foreign_key = &info.foreign_key;
    let description = info
        .description
        .as_ref()
        .map(|d| quote! { .description(#d) });
    quote! {
        ::tessera_core::schema::ForeignKeyTargetMeta::new(
            #key,
            #foreign_key,
            ::tessera_core::schema::ModelRef::of::<
                <#ty as ::tessera_core::schema::Related>::Target
            >(),
        )
        #description
    }
}

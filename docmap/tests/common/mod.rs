#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use docmap::memory::InMemoryStore;
use docmap::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[record(discriminator = "Customer")]
pub struct Customer {
    #[record(id)]
    pub id: Option<String>,
    pub display_name: String,
}

impl Customer {
    pub fn new(id: Option<&str>, name: &str) -> Self {
        Self {
            id: id.map(str::to_string),
            display_name: name.to_string(),
        }
    }
}

/// An order whose customer is loaded eagerly and stored on demand.
#[derive(Debug, Clone, Default, Record)]
#[record(collection = "orders")]
pub struct Order {
    #[record(id)]
    pub id: Option<String>,
    pub total: f64,
    #[record(reference(auto_store))]
    pub customer: Option<Ref<Customer>>,
}

#[derive(Debug, Clone, Default, Record)]
#[record(collection = "orders")]
pub struct LazyOrder {
    #[record(id)]
    pub id: Option<String>,
    pub total: f64,
    #[record(reference(lazy))]
    pub customer: Option<Ref<Customer>>,
}

/// References in every shape the serializer distinguishes.
#[derive(Debug, Clone, Default, Record)]
pub struct Team {
    #[record(id)]
    pub id: Option<String>,
    #[record(reference)]
    pub owner: Option<Ref<Customer>>,
    #[record(reference)]
    pub members: Vec<Ref<Customer>>,
    #[record(reference(lazy))]
    pub by_role: IndexMap<String, Ref<Customer>>,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[record(embedded, discriminator = "Address")]
pub struct Address {
    pub street: String,
    pub city: String,
    #[record(use_if_null)]
    pub zip: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, MappedEnum)]
#[record(discriminator = "Priority")]
pub enum Priority {
    #[default]
    Low,
    High,
    #[record(rename = "urgent")]
    Critical,
}

/// Covers the plain conversions: no references, encryption or additional data.
#[allow(non_snake_case)]
#[derive(Debug, Clone, Default, PartialEq, Record)]
#[record(collection = "profiles")]
pub struct Profile {
    #[record(id)]
    pub id: Option<ObjectId>,
    pub name: String,
    pub age: i32,
    pub score: f64,
    pub active: bool,
    pub tags: Vec<String>,
    pub labels: BTreeSet<String>,
    pub counters: BTreeMap<String, i64>,
    pub address: Option<Address>,
    pub previous: Vec<Address>,
    pub priority: Priority,
    pub watch: HashSet<Priority>,
    pub created: Option<DateTime<Utc>>,
    pub orderDate: Option<bson::DateTime>,
}

#[derive(Debug, Clone, Default, Record)]
pub struct Contact {
    #[record(id)]
    pub id: Option<String>,
    #[record(alias = "fullName", alias = "full_name_v1")]
    pub name: String,
    #[record(transient)]
    pub session: String,
    #[record(read_only)]
    pub computed: String,
    pub nickname: Option<String>,
    #[record(additional_data)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Record)]
pub struct Snapshot {
    #[record(id)]
    pub id: Option<String>,
    pub label: String,
    #[record(additional_data(read_only))]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, Record)]
#[record(polymorphic, discriminator = "Animal")]
pub struct Animal {
    #[record(id)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, Record)]
pub struct Dog {
    pub good_boy: bool,
    #[record(flatten)]
    pub animal: Animal,
}

#[derive(Debug, Clone, Default, Record)]
pub struct Zoo {
    #[record(id)]
    pub id: Option<String>,
    pub star: Option<Box<dyn Record>>,
    pub animals: Vec<Box<dyn Record>>,
    pub mixed: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Money {
    pub cents: i64,
    pub currency: String,
}

custom_field_value!(Money);

/// Stores money as `"<cents> <currency>"`.
pub struct MoneyConverter;

impl TypeConverter<Money> for MoneyConverter {
    fn marshall(&self, value: &Money) -> MappingResult<Bson> {
        Ok(Bson::String(format!("{} {}", value.cents, value.currency)))
    }

    fn unmarshall(&self, value: Bson) -> MappingResult<Money> {
        let text = value
            .as_str()
            .ok_or_else(|| MappingError::Conversion(format!("money from {value}")))?;
        let (cents, currency) = text
            .split_once(' ')
            .ok_or_else(|| MappingError::Conversion(format!("money from {text}")))?;
        Ok(Money {
            cents: cents
                .parse()
                .map_err(|_| MappingError::Conversion(format!("cents from {cents}")))?,
            currency: currency.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Record)]
pub struct Ledger {
    #[record(id)]
    pub id: Option<String>,
    pub balance: Option<Money>,
    pub history: Vec<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[record(discriminator = "Account")]
pub struct Account {
    #[record(id)]
    pub id: Option<String>,
    #[record(encrypted(key = "pii"))]
    pub ssn: String,
    #[record(encrypted)]
    pub pin: i32,
    #[record(encrypted)]
    pub backup_codes: Vec<String>,
}

#[derive(Debug, Clone, Default, Record)]
pub struct Vault {
    #[record(id)]
    pub id: Option<String>,
    #[record(encrypted(key = "unknown"))]
    pub secret: String,
}

#[derive(Debug, Clone, Default, Record)]
pub struct Versioned {
    #[record(id)]
    pub id: Option<String>,
    #[record(version)]
    pub version: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Record)]
pub struct Anonymous {
    pub note: String,
}

/// XORs every byte; only the key names `pii` and `Account` exist.
#[derive(Debug, Default)]
pub struct XorEncryption;

impl XorEncryption {
    fn apply(key_name: &str, input: &[u8]) -> MappingResult<Vec<u8>> {
        if !matches!(key_name, "pii" | "Account") {
            return Err(MappingError::Encryption(format!("no key named {key_name}")));
        }
        Ok(input.iter().map(|byte| byte ^ 0x5a).collect())
    }
}

impl ValueEncryption for XorEncryption {
    fn encrypt(&self, key_name: &str, plaintext: &[u8]) -> MappingResult<Vec<u8>> {
        Self::apply(key_name, plaintext)
    }

    fn decrypt(&self, key_name: &str, ciphertext: &[u8]) -> MappingResult<Vec<u8>> {
        Self::apply(key_name, ciphertext)
    }
}

/// Fresh metadata with every discriminated fixture registered.
pub fn metadata() -> Arc<Metadata> {
    let metadata = Arc::new(Metadata::new());
    metadata.register::<Customer>().unwrap();
    metadata.register::<Address>().unwrap();
    metadata.register::<Animal>().unwrap();
    metadata.register::<Dog>().unwrap();
    metadata.registry().register_enum::<Priority>().unwrap();
    metadata
}

pub fn mapper_builder() -> DocumentMapperBuilder {
    DocumentMapper::builder()
        .metadata(metadata())
        .converter::<Money, _>(MoneyConverter)
        .encryption(Arc::new(XorEncryption))
}

pub fn mapper() -> DocumentMapper {
    mapper_builder().build()
}

pub fn store() -> Arc<InMemoryStore> {
    InMemoryStore::builder().mapper(mapper_builder()).build()
}

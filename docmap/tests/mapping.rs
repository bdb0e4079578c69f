mod common;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use bson::spec::BinarySubtype;
use chrono::TimeZone;
use docmap::enumeration::EnumValue;
use docmap::prelude::*;
use pretty_assertions::assert_eq;

use common::*;

fn sample_profile() -> Profile {
    Profile {
        id: Some(ObjectId::new()),
        name: "Ada".into(),
        age: 36,
        score: 9.75,
        active: true,
        tags: vec!["math".into(), "engines".into()],
        labels: BTreeSet::from(["b".to_string(), "a".to_string()]),
        counters: BTreeMap::from([("logins".to_string(), 12), ("posts".to_string(), -3)]),
        address: Some(Address {
            street: "12 St James's Square".into(),
            city: "London".into(),
            zip: Some("SW1Y".into()),
        }),
        previous: vec![Address {
            street: "Marylebone".into(),
            city: "London".into(),
            zip: None,
        }],
        priority: Priority::Critical,
        watch: HashSet::from([Priority::High, Priority::Low]),
        created: chrono::Utc.timestamp_millis_opt(1_700_000_000_123).single(),
        orderDate: Some(bson::DateTime::from_millis(1_600_000_000_000)),
    }
}

#[test]
fn plain_records_round_trip() {
    let mapper = mapper();
    let profile = sample_profile();

    let document = mapper.serialize(&profile).unwrap();
    let restored: Profile = mapper.deserialize(&document).unwrap();
    assert_eq!(restored, profile);

    let again = mapper.serialize(&restored).unwrap();
    assert_eq!(again.get("_id"), document.get("_id"));
    assert_eq!(again.get("counters"), document.get("counters"));
}

#[test]
fn simple_records_serialize_to_flat_documents() {
    let mapper = mapper();
    let document = mapper.serialize(&Customer::new(Some("c1"), "Ada")).unwrap();
    assert_eq!(document, doc! { "_id": "c1", "display_name": "Ada" });
}

#[test]
fn identity_is_always_stored_under_the_sentinel() {
    let mapper = mapper();
    for handle in [
        Customer::handle(),
        Profile::handle(),
        Contact::handle(),
        Animal::handle(),
        Dog::handle(),
        Account::handle(),
    ] {
        let descriptor = mapper.metadata().describe(handle).unwrap();
        assert_eq!(descriptor.require_identity().unwrap().external_name(), ID_KEY);
    }

    let document = mapper.serialize(&sample_profile()).unwrap();
    assert!(matches!(document.get("_id"), Some(Bson::ObjectId(_))));
    assert!(!document.contains_key("id"));
}

#[test]
fn translated_names_resolve_both_ways() {
    let mapper = mapper();
    assert_eq!(
        mapper.resolve_external_name::<Profile>("orderDate").unwrap(),
        "order_date"
    );
    let field = mapper
        .resolve_field(Profile::handle(), "order_date")
        .unwrap()
        .unwrap();
    assert_eq!(field.name(), "orderDate");
    assert_eq!(field.external_name(), "order_date");

    let document = mapper.serialize(&sample_profile()).unwrap();
    assert!(document.contains_key("order_date"));
    assert!(!document.contains_key("orderDate"));
}

#[test]
fn external_names_survive_cache_clears() {
    let mapper = mapper();
    let names = |mapper: &DocumentMapper| -> Vec<String> {
        ["id", "name", "orderDate", "counters", "address"]
            .into_iter()
            .map(|field| mapper.resolve_external_name::<Profile>(field).unwrap())
            .collect()
    };

    let before = names(&mapper);
    assert_eq!(before, names(&mapper));
    mapper.clear_metadata_cache();
    assert_eq!(before, names(&mapper));
    assert!(matches!(
        mapper.resolve_external_name::<Profile>("nope"),
        Err(MappingError::FieldNotFound { .. })
    ));
}

#[test]
fn null_fields_are_omitted_unless_marked() {
    let mapper = mapper();
    let profile = Profile {
        address: Some(Address {
            street: "Main".into(),
            city: "Oslo".into(),
            zip: None,
        }),
        ..Profile::default()
    };
    let document = mapper.serialize(&profile).unwrap();
    assert!(!document.contains_key("_id"));
    assert!(!document.contains_key("created"));

    let address = document.get_document("address").unwrap();
    assert_eq!(address.get("zip"), Some(&Bson::Null));
    assert_eq!(
        *address,
        doc! { "street": "Main", "city": "Oslo", "zip": Bson::Null }
    );
}

#[test]
fn transient_and_read_only_fields_are_not_written() {
    let mapper = mapper();
    let contact = Contact {
        id: Some("c1".into()),
        name: "Ada".into(),
        session: "temporary".into(),
        computed: "derived".into(),
        ..Contact::default()
    };
    let document = mapper.serialize(&contact).unwrap();
    assert_eq!(document, doc! { "_id": "c1", "name": "Ada" });

    let restored: Contact = mapper
        .deserialize(&doc! { "_id": "c1", "name": "Ada", "session": "s", "computed": "x" })
        .unwrap();
    assert_eq!(restored.session, "");
    assert_eq!(restored.computed, "x");
    assert!(restored.extra.is_empty());
}

#[test]
fn aliases_are_accepted_on_read() {
    let mapper = mapper();
    let contact: Contact = mapper
        .deserialize(&doc! { "_id": "c1", "full_name_v1": "Ada" })
        .unwrap();
    assert_eq!(contact.name, "Ada");

    let contact: Contact = mapper
        .deserialize(&doc! { "_id": "c1", "fullName": "Grace", "name": "Ada" })
        .unwrap();
    assert_eq!(contact.name, "Ada");
}

#[test]
fn unknown_keys_are_captured_as_additional_data() {
    let mapper = mapper();
    let document = doc! {
        "_id": "c1",
        "name": "Ada",
        "legacy": 1,
        "home": { "class_name": "Address", "street": "Main", "city": "Oslo" },
        "history": [{ "class_name": "Address", "street": "Side", "city": "Bergen" }, 3],
        "plain": { "a": true },
    };
    let contact: Contact = mapper.deserialize(&document).unwrap();

    let keys: Vec<&str> = contact.extra.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["legacy", "home", "history", "plain"]);
    assert_eq!(contact.extra["legacy"].as_scalar(), Some(&Bson::Int32(1)));

    let home = contact.extra["home"]
        .as_record()
        .and_then(|record| record.downcast_ref::<Address>())
        .unwrap();
    assert_eq!(home.city, "Oslo");

    let history = contact.extra["history"].as_list().unwrap();
    assert_eq!(
        history[0]
            .as_record()
            .and_then(|record| record.downcast_ref::<Address>())
            .map(|address| address.city.as_str()),
        Some("Bergen")
    );
    assert_eq!(history[1].as_scalar(), Some(&Bson::Int32(3)));

    let plain = contact.extra["plain"].as_map().unwrap();
    assert_eq!(plain["a"].as_scalar(), Some(&Bson::Boolean(true)));
}

#[test]
fn additional_data_is_flattened_on_write() {
    let mapper = mapper();
    let mut extra = IndexMap::new();
    extra.insert("legacy".to_string(), Value::scalar(1));
    extra.insert("name".to_string(), Value::scalar("shadowed"));
    extra.insert(
        "home".to_string(),
        Address {
            street: "Main".into(),
            city: "Oslo".into(),
            zip: None,
        }
        .to_value(),
    );
    let contact = Contact {
        id: Some("c1".into()),
        name: "Ada".into(),
        extra,
        ..Contact::default()
    };

    let document = mapper.serialize(&contact).unwrap();
    assert_eq!(
        document,
        doc! {
            "_id": "c1",
            "name": "Ada",
            "legacy": 1,
            "home": { "street": "Main", "city": "Oslo", "zip": Bson::Null, "class_name": "Address" },
        }
    );
}

#[test]
fn read_only_additional_data_is_only_read() {
    let mapper = mapper();
    let snapshot: Snapshot = mapper
        .deserialize(&doc! { "_id": "s1", "label": "x", "other": "kept" })
        .unwrap();
    assert_eq!(snapshot.extra.len(), 1);

    let document = mapper.serialize(&snapshot).unwrap();
    assert_eq!(document, doc! { "_id": "s1", "label": "x" });
}

#[test]
fn polymorphic_records_carry_their_own_discriminator() {
    let mapper = mapper();
    let dog = Dog {
        good_boy: true,
        animal: Animal {
            id: Some("d1".into()),
            name: "Rex".into(),
        },
    };
    let document = mapper.serialize(&dog).unwrap();
    assert_eq!(
        document.get_str(DISCRIMINATOR_KEY).unwrap(),
        std::any::type_name::<Dog>()
    );
    assert_eq!(document.get_str("_id").unwrap(), "d1");
    assert_eq!(document.get_str("name").unwrap(), "Rex");

    let animal = Animal {
        id: Some("a1".into()),
        name: "Generic".into(),
    };
    let document = mapper.serialize(&animal).unwrap();
    assert_eq!(document.get_str(DISCRIMINATOR_KEY).unwrap(), "Animal");
}

#[test]
fn discriminators_select_the_concrete_type() {
    let mapper = mapper();
    let document = doc! {
        "_id": "d1",
        "name": "Rex",
        "good_boy": true,
        "class_name": std::any::type_name::<Dog>(),
    };
    let record = mapper
        .deserialize_record(Animal::handle(), &document)
        .unwrap();
    let dog = record.downcast_ref::<Dog>().unwrap();
    assert!(dog.good_boy);
    assert_eq!(dog.animal.name, "Rex");
    assert_eq!(dog.animal.id.as_deref(), Some("d1"));

    assert!(matches!(
        mapper.deserialize::<Customer>(&doc! { "_id": "c1", "class_name": "Nope" }),
        Err(MappingError::UnknownDiscriminator(discriminator)) if discriminator == "Nope"
    ));
}

#[test]
fn registered_types_still_resolve_after_a_cache_clear() {
    let mapper = mapper();
    let dog = doc! {
        "_id": "d1",
        "name": "Rex",
        "good_boy": true,
        "class_name": std::any::type_name::<Dog>(),
    };
    let zoo = doc! { "mixed": [{ "class_name": "Priority", "name": "High" }] };
    mapper.clear_metadata_cache();

    let record = mapper.deserialize_record(Animal::handle(), &dog).unwrap();
    assert!(record.downcast_ref::<Dog>().unwrap().good_boy);

    let restored: Zoo = mapper.deserialize(&zoo).unwrap();
    match &restored.mixed[0] {
        Value::Enum(value) => assert_eq!(value.to_enum::<Priority>().unwrap(), Priority::High),
        other => panic!("expected an enum, got {other:?}"),
    }
}

#[test]
fn nested_entities_lose_their_identity() {
    let mapper = mapper();
    let zoo = Zoo {
        id: Some("z1".into()),
        star: Some(Box::new(Dog {
            good_boy: true,
            animal: Animal {
                id: Some("d1".into()),
                name: "Rex".into(),
            },
        })),
        animals: vec![Box::new(Animal {
            id: Some("a1".into()),
            name: "Tom".into(),
        })],
        mixed: Vec::new(),
    };

    let document = mapper.serialize(&zoo).unwrap();
    let star = document.get_document("star").unwrap();
    assert!(!star.contains_key("_id"));
    assert_eq!(star.get_str(DISCRIMINATOR_KEY).unwrap(), std::any::type_name::<Dog>());

    let restored: Zoo = mapper.deserialize(&document).unwrap();
    let star = restored.star.as_ref().unwrap().downcast_ref::<Dog>().unwrap();
    assert_eq!(star.animal.name, "Rex");
    assert_eq!(star.animal.id, None);
    let first = restored.animals[0].downcast_ref::<Animal>().unwrap();
    assert_eq!(first.name, "Tom");
}

#[test]
fn enums_use_names_or_discriminated_pairs() {
    let mapper = mapper();
    let profile = Profile {
        priority: Priority::Critical,
        ..Profile::default()
    };
    let document = mapper.serialize(&profile).unwrap();
    assert_eq!(document.get_str("priority").unwrap(), "urgent");

    let zoo = Zoo {
        mixed: vec![
            Value::Enum(EnumValue::of(&Priority::High)),
            Value::scalar("plain"),
        ],
        ..Zoo::default()
    };
    let document = mapper.serialize(&zoo).unwrap();
    assert_eq!(
        document.get_array("mixed").unwrap(),
        &vec![
            Bson::Document(doc! { "class_name": "Priority", "name": "High" }),
            Bson::String("plain".into()),
        ]
    );

    let restored: Zoo = mapper.deserialize(&document).unwrap();
    match &restored.mixed[0] {
        Value::Enum(value) => assert_eq!(value.to_enum::<Priority>().unwrap(), Priority::High),
        other => panic!("expected an enum, got {other:?}"),
    }

    let restored: Profile = mapper
        .deserialize(&doc! { "priority": { "class_name": "Priority", "name": "High" } })
        .unwrap();
    assert_eq!(restored.priority, Priority::High);

    assert!(matches!(
        mapper.deserialize::<Profile>(&doc! { "priority": "Medium" }),
        Err(MappingError::Coercion { .. })
    ));
}

#[test]
fn scalars_are_coerced_losslessly() {
    let mapper = mapper();
    let id = ObjectId::new();
    let profile: Profile = mapper
        .deserialize(&doc! {
            "_id": id.to_hex(),
            "age": 41_i64,
            "score": 3,
            "active": 1,
            "counters": { "logins": 5 },
            "created": "2024-05-01T10:00:00Z",
        })
        .unwrap();
    assert_eq!(profile.id, Some(id));
    assert_eq!(profile.age, 41);
    assert_eq!(profile.score, 3.0);
    assert!(profile.active);
    assert_eq!(profile.counters["logins"], 5);
    assert_eq!(
        profile.created,
        chrono::Utc
            .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
            .single()
    );
}

#[test]
fn incompatible_values_report_the_field() {
    let mapper = mapper();
    match mapper.deserialize::<Profile>(&doc! { "age": "forty" }) {
        Err(MappingError::Coercion { field, actual, .. }) => {
            assert_eq!(field, "age");
            assert_eq!(actual, "String");
        }
        other => panic!("expected a coercion error, got {other:?}"),
    }
    assert!(matches!(
        mapper.deserialize::<Profile>(&doc! { "age": i64::MAX }),
        Err(MappingError::Coercion { .. })
    ));
}

#[test]
fn numbers_at_the_edge_of_precision_are_not_rounded() {
    let mapper = mapper();
    match mapper.deserialize::<Profile>(&doc! { "score": i64::MAX }) {
        Err(MappingError::Coercion { field, .. }) => assert_eq!(field, "score"),
        other => panic!("expected a coercion error, got {other:?}"),
    }
    assert!(matches!(
        mapper.deserialize::<Profile>(&doc! { "counters": { "x": 9.223372036854775807e18 } }),
        Err(MappingError::Coercion { .. })
    ));

    let exact: i64 = 1 << 53;
    let profile: Profile = mapper
        .deserialize(&doc! { "score": exact, "counters": { "x": -4096.0 } })
        .unwrap();
    assert_eq!(profile.score, 9_007_199_254_740_992.0);
    assert_eq!(profile.counters["x"], -4096);
}

#[test]
fn identities_that_cannot_be_coerced_are_rejected() {
    let mapper = mapper();
    assert!(matches!(
        mapper.deserialize::<Profile>(&doc! { "_id": "not-an-object-id" }),
        Err(MappingError::IdentityMismatch { .. })
    ));
    assert!(matches!(
        mapper.deserialize::<Profile>(&doc! { "_id": [1, 2] }),
        Err(MappingError::IdentityMismatch { .. })
    ));
}

#[test]
fn custom_types_go_through_their_converter() {
    let mapper = mapper();
    let ledger = Ledger {
        id: Some("l1".into()),
        balance: Some(Money {
            cents: 1250,
            currency: "EUR".into(),
        }),
        history: vec![Money {
            cents: -50,
            currency: "EUR".into(),
        }],
    };
    let document = mapper.serialize(&ledger).unwrap();
    assert_eq!(
        document,
        doc! { "_id": "l1", "balance": "1250 EUR", "history": ["-50 EUR"] }
    );

    let restored: Ledger = mapper.deserialize(&document).unwrap();
    assert_eq!(restored.balance, ledger.balance);
    assert_eq!(restored.history, ledger.history);
}

#[test]
fn custom_types_without_converter_fail() {
    let mut mapper = mapper();
    assert!(mapper.deregister_converter::<Money>());
    let ledger = Ledger {
        balance: Some(Money {
            cents: 1,
            currency: "EUR".into(),
        }),
        ..Ledger::default()
    };
    assert!(matches!(
        mapper.serialize(&ledger),
        Err(MappingError::MissingConverter(_))
    ));
    assert!(matches!(
        mapper.deserialize::<Ledger>(&doc! { "balance": "1 EUR" }),
        Err(MappingError::MissingConverter(_))
    ));

    mapper.register_converter::<Money, _>(MoneyConverter);
    assert!(mapper.serialize(&ledger).is_ok());
}

#[test]
fn encrypted_fields_are_stored_as_ciphertext() {
    let mapper = mapper();
    let account = Account {
        id: Some("a1".into()),
        ssn: "123-45-6789".into(),
        pin: 1234,
        backup_codes: vec!["one".into(), "two".into()],
    };
    let document = mapper.serialize(&account).unwrap();

    match document.get("ssn") {
        Some(Bson::Binary(binary)) => {
            assert_eq!(binary.subtype, BinarySubtype::Generic);
            assert_ne!(binary.bytes, b"123-45-6789".to_vec());
            let plain: Vec<u8> = binary.bytes.iter().map(|byte| byte ^ 0x5a).collect();
            assert_eq!(plain, b"123-45-6789".to_vec());
        }
        other => panic!("expected ciphertext, got {other:?}"),
    }
    assert!(matches!(document.get("pin"), Some(Bson::Binary(_))));

    let restored: Account = mapper.deserialize(&document).unwrap();
    assert_eq!(restored, account);
}

#[test]
fn encryption_failures_are_reported() {
    let mapper = mapper();
    let vault = Vault {
        id: Some("v1".into()),
        secret: "s".into(),
    };
    assert!(matches!(
        mapper.serialize(&vault),
        Err(MappingError::Encryption(_))
    ));

    let unconfigured = DocumentMapper::builder().metadata(metadata()).build();
    let account = Account {
        ssn: "1".into(),
        ..Account::default()
    };
    assert!(matches!(
        unconfigured.serialize(&account),
        Err(MappingError::Encryption(_))
    ));
    assert!(matches!(
        mapper.deserialize::<Account>(&doc! { "ssn": "plaintext" }),
        Err(MappingError::Encryption(_))
    ));
}

#[test]
fn documents_cross_json() {
    let mapper = mapper();
    let customer = Customer::new(Some("c1"), "Ada");
    let json = mapper.serialize(&customer).unwrap().to_json().unwrap();
    assert_eq!(json["_id"], "c1");
    assert_eq!(json["display_name"], "Ada");

    let restored: Customer = mapper
        .deserialize(&Document::from_json(json).unwrap())
        .unwrap();
    assert_eq!(restored, customer);
}

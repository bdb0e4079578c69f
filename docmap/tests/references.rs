mod common;

use std::sync::Arc;

use docmap::prelude::*;
use pretty_assertions::assert_eq;

use common::*;

fn customer_pointer(id: &str) -> Bson {
    Bson::Document(doc! { "discriminator": "Customer", "id": id, "collection_name": "customer" })
}

fn seed_customer(store: &docmap::memory::InMemoryStore, id: &str, name: &str) {
    store
        .put_document("customer", doc! { "_id": id, "display_name": name })
        .unwrap();
}

#[test]
fn unstored_customers_are_stored_before_the_order() {
    let store = store();
    let order = Order {
        id: Some("o1".into()),
        total: 9.5,
        customer: Some(Ref::new(Customer::new(Some("c1"), "Ada"))),
    };

    let document = store.mapper().serialize(&order).unwrap();
    assert_eq!(document, doc! { "_id": "o1", "total": 9.5, "customer": "c1" });
    assert_eq!(store.store_count(), 1);
    assert_eq!(
        store.get_document("customer", &Bson::from("c1")),
        Some(doc! { "_id": "c1", "display_name": "Ada" })
    );

    store.mapper().serialize(&order).unwrap();
    assert_eq!(store.store_count(), 1);
}

#[test]
fn auto_store_assigns_missing_identities() {
    let store = store();
    let order = Order {
        id: Some("o1".into()),
        total: 1.0,
        customer: Some(Ref::new(Customer::new(None, "Grace"))),
    };
    let document = store.mapper().serialize(&order).unwrap();
    let id = document.get("customer").cloned().unwrap();
    assert!(matches!(&id, Bson::String(hex) if hex.len() == 24));
    assert_eq!(store.count("customer"), 1);
    assert!(store.get_document("customer", &id).is_some());
}

#[test]
fn unstored_references_fail_without_auto_store() {
    let store = store();
    let team = Team {
        id: Some("t1".into()),
        owner: Some(Ref::new(Customer::new(None, "Ada"))),
        ..Team::default()
    };
    assert!(matches!(
        store.mapper().serialize(&team),
        Err(MappingError::ReferenceNotStored(_))
    ));
    assert_eq!(store.count("customer"), 0);
}

#[test]
fn references_need_a_resolver() {
    let mapper = mapper();
    let order = Order {
        customer: Some(Ref::new(Customer::new(Some("c1"), "Ada"))),
        ..Order::default()
    };
    assert!(matches!(
        mapper.serialize(&order),
        Err(MappingError::NoReferenceResolver)
    ));
    assert!(matches!(
        mapper.deserialize::<Order>(&doc! { "_id": "o1", "customer": "c1" }),
        Err(MappingError::NoReferenceResolver)
    ));
    assert!(matches!(
        mapper.deserialize::<LazyOrder>(&doc! { "_id": "o1", "customer": "c1" }),
        Err(MappingError::NoReferenceResolver)
    ));

    let order: Order = mapper.deserialize(&doc! { "_id": "o1" }).unwrap();
    assert!(order.customer.is_none());
}

#[test]
fn eager_references_load_while_reading() {
    let store = store();
    seed_customer(&store, "c1", "Ada");

    let order: Order = store
        .mapper()
        .deserialize(&doc! { "_id": "o1", "total": 9.5, "customer": "c1" })
        .unwrap();
    assert_eq!(store.fetch_count(), 1);

    let customer = order.customer.unwrap();
    assert!(customer.is_resolved());
    assert_eq!(
        customer.fetch().unwrap().as_deref(),
        Some(&Customer::new(Some("c1"), "Ada"))
    );
    assert_eq!(store.fetch_count(), 1);

    let order: Order = store
        .mapper()
        .deserialize(&doc! { "_id": "o2", "customer": "missing" })
        .unwrap();
    assert!(order.customer.is_none());
}

#[test]
fn lazy_references_bind_without_loading() {
    let store = store();
    seed_customer(&store, "c1", "Ada");

    let order: LazyOrder = store
        .mapper()
        .deserialize(&doc! {
            "_id": "o1",
            "total": 9.5,
            "customer": { "discriminator": "Customer", "id": "c1" },
        })
        .unwrap();
    assert_eq!(order.id.as_deref(), Some("o1"));
    assert_eq!(order.total, 9.5);

    let customer = order.customer.as_ref().unwrap();
    let lazy = customer.as_lazy().unwrap();
    assert!(!customer.is_resolved());
    assert_eq!(lazy.id(), &Bson::from("c1"));
    assert_eq!(lazy.target_type(), Customer::handle());
    assert_eq!(customer.id().unwrap(), Some(Bson::from("c1")));
    assert_eq!(store.fetch_count(), 0);
}

#[test]
fn pointers_resolve_against_fresh_metadata() {
    let store = docmap::memory::InMemoryStore::builder()
        .mapper(DocumentMapper::builder().metadata(Arc::new(Metadata::new())))
        .build();
    seed_customer(&store, "c1", "Ada");

    let order: LazyOrder = store
        .mapper()
        .deserialize(&doc! {
            "_id": "o1",
            "customer": { "discriminator": "Customer", "id": "c1" },
        })
        .unwrap();
    let customer = order.customer.unwrap();
    assert_eq!(customer.as_lazy().unwrap().target_type(), Customer::handle());
    assert_eq!(
        customer.fetch().unwrap().as_deref(),
        Some(&Customer::new(Some("c1"), "Ada"))
    );
}

#[test]
fn lazy_references_resolve_once() {
    let store = store();
    seed_customer(&store, "c1", "Ada");
    let order: LazyOrder = store
        .mapper()
        .deserialize(&doc! { "_id": "o1", "customer": "c1" })
        .unwrap();
    let customer = order.customer.unwrap();

    for _ in 0..3 {
        let name = customer.with(|customer| customer.display_name.clone()).unwrap();
        assert_eq!(name.as_deref(), Some("Ada"));
    }
    assert!(customer.is_resolved());
    assert_eq!(store.fetch_count(), 1);

    let first = customer.fetch().unwrap().unwrap();
    let second = customer.clone().fetch().unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(store.fetch_count(), 1);
}

#[test]
fn concurrent_first_access_converges() {
    let store = store();
    seed_customer(&store, "c1", "Ada");
    let order: LazyOrder = store
        .mapper()
        .deserialize(&doc! { "_id": "o1", "customer": "c1" })
        .unwrap();
    let customer = order.customer.unwrap();

    let fetched: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| customer.fetch().unwrap().unwrap()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });
    let memoized = customer.fetch().unwrap().unwrap();
    for customer in &fetched {
        assert!(Arc::ptr_eq(customer, &memoized));
    }
    assert!(store.fetch_count() >= 1);
}

#[test]
fn vetoed_eager_references_stay_unset() {
    let store = store();
    seed_customer(&store, "c1", "Ada");
    store.veto::<Customer>();

    let order: Order = store
        .mapper()
        .deserialize(&doc! { "_id": "o1", "customer": "c1" })
        .unwrap();
    assert!(order.customer.is_none());
    assert_eq!(store.fetch_count(), 1);

    store.allow::<Customer>();
    let order: Order = store
        .mapper()
        .deserialize(&doc! { "_id": "o1", "customer": "c1" })
        .unwrap();
    assert!(order.customer.is_some());
}

#[test]
fn vetoed_lazy_references_resolve_to_nothing_once() {
    let store = store();
    seed_customer(&store, "c1", "Ada");
    let order: LazyOrder = store
        .mapper()
        .deserialize(&doc! { "_id": "o1", "customer": "c1" })
        .unwrap();
    let customer = order.customer.unwrap();

    store.veto::<Customer>();
    assert!(customer.fetch().unwrap().is_none());
    assert!(customer.is_resolved());

    store.allow::<Customer>();
    assert!(customer.fetch().unwrap().is_none());
    assert_eq!(store.fetch_count(), 1);
}

#[test]
fn lazy_references_fail_once_the_resolver_is_gone() {
    let store = store();
    seed_customer(&store, "c1", "Ada");
    let order: LazyOrder = store
        .mapper()
        .deserialize(&doc! { "_id": "o1", "customer": "c1" })
        .unwrap();
    drop(store);

    let customer = order.customer.unwrap();
    assert_eq!(customer.id().unwrap(), Some(Bson::from("c1")));
    assert!(matches!(
        customer.fetch(),
        Err(MappingError::NoReferenceResolver)
    ));
    assert!(!customer.is_resolved());
}

#[test]
fn single_references_store_ids_and_collections_store_pointers() {
    let store = store();
    for (id, name) in [("c1", "Ada"), ("c2", "Grace"), ("c3", "Edsger")] {
        store.save(&Customer::new(Some(id), name)).unwrap();
    }
    let mut by_role = IndexMap::new();
    by_role.insert("lead".to_string(), Ref::new(Customer::new(Some("c3"), "Edsger")));
    let team = Team {
        id: Some("t1".into()),
        owner: Some(Ref::new(Customer::new(Some("c1"), "Ada"))),
        members: vec![Ref::new(Customer::new(Some("c2"), "Grace"))],
        by_role,
    };

    let document = store.mapper().serialize(&team).unwrap();
    assert_eq!(
        document,
        doc! {
            "_id": "t1",
            "owner": "c1",
            "members": [customer_pointer("c2")],
            "by_role": { "lead": customer_pointer("c3") },
        }
    );

    let restored: Team = store.mapper().deserialize(&document).unwrap();
    assert!(restored.owner.as_ref().unwrap().is_resolved());
    assert_eq!(
        restored.members[0].fetch().unwrap().unwrap().display_name,
        "Grace"
    );
    let lead = restored.by_role["lead"].as_lazy().unwrap();
    assert_eq!(lead.id(), &Bson::from("c3"));
    assert_eq!(lead.collection(), Some("customer"));
    assert!(!lead.is_resolved());
}

#[test]
fn unforced_lazy_references_serialize_without_loading() {
    let store = store();
    seed_customer(&store, "c1", "Ada");
    seed_customer(&store, "c3", "Edsger");

    let order: LazyOrder = store
        .mapper()
        .deserialize(&doc! { "_id": "o1", "total": 2.0, "customer": "c1" })
        .unwrap();
    let document = store.mapper().serialize(&order).unwrap();
    assert_eq!(document, doc! { "_id": "o1", "total": 2.0, "customer": "c1" });

    let team: Team = store
        .mapper()
        .deserialize(&doc! { "_id": "t1", "by_role": { "lead": customer_pointer("c3") } })
        .unwrap();
    let document = store.mapper().serialize(&team).unwrap();
    assert_eq!(
        document.get_document("by_role").unwrap(),
        &doc! { "lead": customer_pointer("c3") }
    );
    assert_eq!(store.fetch_count(), 0);
}

#[test]
fn reference_ids_are_coerced_to_the_target_identity() {
    let store = store();
    let id = ObjectId::new();
    seed_customer(&store, &id.to_hex(), "Ada");

    let order: Order = store
        .mapper()
        .deserialize(&doc! { "_id": "o1", "customer": id })
        .unwrap();
    let customer = order.customer.unwrap().fetch().unwrap().unwrap();
    assert_eq!(customer.id, Some(id.to_hex()));
}

#[test]
fn collection_references_drop_missing_elements() {
    let store = store();
    seed_customer(&store, "c2", "Grace");

    let team: Team = store
        .mapper()
        .deserialize(&doc! {
            "_id": "t1",
            "members": [Bson::Null, customer_pointer("gone"), customer_pointer("c2")],
        })
        .unwrap();
    assert_eq!(team.members.len(), 1);
    assert_eq!(team.members[0].id().unwrap(), Some(Bson::from("c2")));

    store.veto::<Customer>();
    let team: Team = store
        .mapper()
        .deserialize(&doc! { "_id": "t1", "members": [customer_pointer("c2")] })
        .unwrap();
    assert!(team.members.is_empty());
}

#[test]
fn pointers_with_unknown_discriminators_fail() {
    let store = store();
    let result = store.mapper().deserialize::<Team>(&doc! {
        "_id": "t1",
        "members": [{ "discriminator": "Supplier", "id": "s1" }],
    });
    assert!(matches!(
        result,
        Err(MappingError::UnknownDiscriminator(discriminator)) if discriminator == "Supplier"
    ));
}

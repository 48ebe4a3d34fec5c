//! End-to-end scenarios over a small order/line model.

use rowmap_update::{
    BatchFactory, Column, CommandOrderer, Error, ModificationCommand, RowCommand, RowIdentityMap,
    SqlType, Table, UpdateConfig, Value, ValueChannel,
};
use std::sync::Arc;

fn orders() -> Table {
    Table::builder("orders")
        .column(Column::new("Id", SqlType::BigInt))
        .column(Column::new("Code", SqlType::Text))
        .primary_key("PK_orders", &["Id"])
        .build()
        .unwrap()
}

fn tenant_orders() -> Table {
    Table::builder("tenant_orders")
        .column(Column::new("TenantId", SqlType::Integer))
        .column(Column::new("OrderId", SqlType::BigInt).nullable(true))
        .primary_key("PK_tenant_orders", &["TenantId", "OrderId"])
        .build()
        .unwrap()
}

fn lines(orders: &Table) -> Table {
    Table::builder("lines")
        .column(Column::new("Id", SqlType::BigInt))
        .column(Column::new("OrderId", SqlType::BigInt).nullable(true))
        .primary_key("PK_lines", &["Id"])
        .foreign_key("FK_lines_orders", &["OrderId"], orders.primary_key())
        .build()
        .unwrap()
}

fn employees() -> Table {
    Table::builder("employees")
        .column(Column::new("Id", SqlType::BigInt))
        .column(Column::new("ManagerId", SqlType::BigInt).nullable(true))
        .primary_key("PK_employees", &["Id"])
        .self_foreign_key("FK_employees_manager", &["ManagerId"])
        .build()
        .unwrap()
}

fn order(id: i64) -> Arc<RowCommand> {
    Arc::new(RowCommand::added("orders", "Order").with_value("Id", id))
}

fn line(id: i64, order_id: Option<i64>) -> Arc<RowCommand> {
    Arc::new(
        RowCommand::added("lines", "OrderLine")
            .with_value("Id", id)
            .with_value("OrderId", order_id),
    )
}

fn employee(id: i64, manager: Option<i64>) -> Arc<RowCommand> {
    Arc::new(
        RowCommand::added("employees", "Employee")
            .with_value("Id", id)
            .with_value("ManagerId", manager),
    )
}

#[test]
fn duplicate_primary_key_is_an_identity_conflict() {
    let orders = orders();
    let mut map = RowIdentityMap::new(orders.primary_key(), false).unwrap();
    map.add(order(1)).unwrap();
    map.add(order(2)).unwrap();

    let err = map.add(order(1)).unwrap_err();
    assert!(err.is_identity_conflict());
    let message = err.to_string();
    assert!(message.contains("'Order'"));
    assert!(message.contains("{'Id'}"));

    assert!(map.try_get_entry(&[Value::BigInt(1)]).is_some());
    assert!(map.try_get_entry(&[Value::BigInt(2)]).is_some());
    assert_eq!(map.len(), 2);
}

#[test]
fn composite_key_with_null_component_is_absent() {
    let table = tenant_orders();
    let factory = table.primary_key().key_value_factory().unwrap();
    let command = RowCommand::added("tenant_orders", "TenantOrder")
        .with_value("TenantId", 5)
        .with_value("OrderId", Value::Null)
        .with_buffer(vec![Value::Int(5), Value::Null]);

    for channel in ValueChannel::ALL {
        assert_eq!(factory.create_key_value(&command, channel), None);
    }

    let map: RowIdentityMap<RowCommand> =
        RowIdentityMap::new(table.primary_key(), false).unwrap();
    assert!(map.try_get_entry(&[Value::Int(5), Value::Null]).is_none());
}

#[test]
fn composite_key_with_null_component_cannot_be_tracked() {
    let table = tenant_orders();
    let mut map = RowIdentityMap::new(table.primary_key(), false).unwrap();
    let command =
        Arc::new(RowCommand::added("tenant_orders", "TenantOrder").with_value("TenantId", 5));
    match map.add(command) {
        Err(Error::NullKeyValue(e)) => assert_eq!(e.column, "OrderId"),
        other => panic!("expected a null key error, got {other:?}"),
    }
}

#[test]
fn nullable_foreign_key_matches_principal() {
    let orders = orders();
    let lines = lines(&orders);
    let fk = lines.foreign_keys()[0].foreign_key_value_factory().unwrap();

    assert!(fk
        .create_dependent_key_value_index(line(1, None).as_ref(), false)
        .is_none());

    let dependent = fk
        .create_dependent_key_value_index(line(1, Some(7)).as_ref(), false)
        .unwrap();
    let principal = fk
        .create_principal_key_value_index(order(7).as_ref(), false)
        .unwrap();
    assert_eq!(dependent, principal);
    assert_eq!(dependent.key().values(), &[Value::BigInt(7)]);

    let other = fk
        .create_principal_key_value_index(order(8).as_ref(), false)
        .unwrap();
    assert_ne!(dependent, other);
}

#[test]
fn factories_are_shared_per_constraint() {
    let orders = orders();
    let lines = lines(&orders);
    let fk = &lines.foreign_keys()[0];
    let first = fk.foreign_key_value_factory().unwrap();
    let second = fk.foreign_key_value_factory().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(
        first.principal_key_value_factory(),
        &orders.primary_key().key_value_factory().unwrap()
    ));
}

#[test]
fn save_is_ordered_and_batched() {
    let orders = orders();
    let lines = lines(&orders);
    let model = vec![orders, lines];
    let config = UpdateConfig::new().max_batch_size(2);
    let orderer = CommandOrderer::new(&model, &config);

    let commands = vec![line(100, Some(1)), line(101, Some(2)), order(1), order(2)];
    let batches = BatchFactory::new(&config)
        .order_and_batch(&orderer, &commands)
        .unwrap();

    let ids: Vec<Vec<(&str, Value)>> = batches
        .iter()
        .map(|batch| {
            batch
                .commands()
                .iter()
                .map(|c| {
                    let table = model.iter().find(|t| t.name() == c.table_name()).unwrap();
                    (c.table_name(), c.current_value(table.column("Id").unwrap()))
                })
                .collect()
        })
        .collect();
    assert_eq!(
        ids,
        vec![
            vec![("orders", Value::BigInt(1)), ("lines", Value::BigInt(100))],
            vec![("orders", Value::BigInt(2)), ("lines", Value::BigInt(101))],
        ]
    );
}

#[test]
fn self_referencing_chain_is_ordered() {
    let model = vec![employees()];
    let orderer = CommandOrderer::new(&model, &UpdateConfig::default());

    let report = employee(2, Some(1));
    let boss = employee(1, None);
    let ordered = orderer
        .order(&[Arc::clone(&report), Arc::clone(&boss)])
        .unwrap();
    assert!(Arc::ptr_eq(&ordered[0], &boss));
    assert!(Arc::ptr_eq(&ordered[1], &report));
}

#[test]
fn self_referencing_cycle_is_detected() {
    let model = vec![employees()];
    let orderer = CommandOrderer::new(&model, &UpdateConfig::default());

    match orderer.order(&[employee(1, Some(2)), employee(2, Some(1))]) {
        Err(Error::CycleDetected { tables }) => {
            assert_eq!(tables, vec!["employees".to_string()]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn sensitive_logging_reveals_conflicting_values() {
    let model = vec![orders()];
    let config = UpdateConfig::from_json(r#"{"sensitive_data_logging": true}"#).unwrap();
    let orderer = CommandOrderer::new(&model, &config);

    let err = orderer.order(&[order(3), order(3)]).unwrap_err();
    assert!(err.is_identity_conflict());
    assert!(err.to_string().contains("{Id: 3}"));
}

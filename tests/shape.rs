#[cfg(test)]
mod tests {
    use depot::{
        FromRow, Item, MappingError, MappingOptions, RowLabeled, RowNames, Shape, Value,
        materialize, stream::TryStreamExt,
    };
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use time::macros::date;

    #[derive(Shape, Default, Debug, Clone, PartialEq)]
    struct Invoice {
        id: i64,
        #[depot(name = "customer_name")]
        customer: String,
        total: Option<Decimal>,
        issued: Option<time::Date>,
        _note: String,
        #[depot(ignore)]
        dirty: bool,
    }

    fn labels(names: &[&str]) -> RowNames {
        names.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn fields() {
        let fields = Invoice::fields();
        assert_eq!(fields.len(), 5);
        assert_eq!(
            fields.iter().map(|v| v.column).collect::<Vec<_>>(),
            ["id", "customer_name", "total", "issued", "note"]
        );
        assert_eq!(fields[1].field, "customer");
        assert_eq!(fields[4].field, "_note");
        assert!(!fields[0].nullable);
        assert!(!fields[1].nullable);
        assert!(fields[2].nullable);
        assert!(fields[3].nullable);
    }

    #[test]
    fn name_values() {
        let invoice = Invoice {
            id: 7,
            customer: "ACME".into(),
            total: Some(Decimal::new(19999, 2)),
            dirty: true,
            ..Default::default()
        };
        let values = invoice.name_values();
        assert_eq!(values.len(), 5);
        assert_eq!(values[0].name.as_deref(), Some("id"));
        assert_eq!(values[0].value, Value::Int64(Some(7)));
        assert_eq!(values[1].name.as_deref(), Some("customer_name"));
        assert_eq!(values[1].value, Value::Varchar(Some("ACME".into())));
        assert_eq!(values[2].value, Value::Decimal(Some(Decimal::new(19999, 2))));
        assert!(values[3].value.is_null());
        assert!(!values.iter().any(|v| v.name.as_deref() == Some("dirty")));
    }

    #[test]
    fn write_key() {
        let mut invoice = Invoice::default();
        assert!(invoice.write_key("ID", Value::Int64(Some(42))).unwrap());
        assert_eq!(invoice.id, 42);
        assert!(!invoice.write_key("number", Value::Int64(Some(1))).unwrap());
        assert!(
            invoice
                .write_key("id", Value::Varchar(Some("forty".into())))
                .is_err()
        );
    }

    #[test]
    fn from_row() {
        let names = labels(&["ID", "customer_name", "total", "issued", "note", "extra"]);
        let plan = Invoice::plan(&names, &MappingOptions::default())
            .expect("Lenient plans skip unknown columns");
        let invoice = Invoice::from_row(
            &plan,
            [
                Value::Int64(Some(3)),
                Value::Null,
                Value::Varchar(Some("12.50".into())),
                Value::Varchar(Some("2025-01-31".into())),
                Value::Varchar(Some("paid".into())),
                Value::Int64(Some(1)),
            ]
            .into(),
            0,
        )
        .expect("Failed to build the invoice");
        assert_eq!(
            invoice,
            Invoice {
                id: 3,
                customer: String::new(),
                total: Some(Decimal::new(1250, 2)),
                issued: Some(date!(2025 - 01 - 31)),
                _note: "paid".into(),
                dirty: false,
            }
        );

        let strict = MappingOptions {
            case_sensitive: true,
            strict_columns: true,
        };
        let error = Invoice::plan(&names, &strict).expect_err("`ID` does not match `id` exactly");
        assert!(matches!(
            error.downcast_ref::<MappingError>(),
            Some(MappingError::UnmappedColumn { column, .. }) if column == "ID"
        ));
    }

    #[tokio::test]
    async fn materialize_rows() {
        let first = labels(&["id", "total"]);
        let second = labels(&["customer_name"]);
        let rows = vec![
            Ok(RowLabeled::new(first.clone(), [Value::Int64(Some(1)), Value::Null].into())),
            Ok(RowLabeled::new(
                first.clone(),
                [Value::Int64(Some(2)), Value::Float64(Some(2.5))].into(),
            )),
            Ok(RowLabeled::new(
                second.clone(),
                [Value::Varchar(Some("Initech".into()))].into(),
            )),
        ];
        let invoices: Vec<Invoice> = materialize(
            futures::stream::iter(rows),
            MappingOptions::default(),
        )
        .try_collect()
        .await
        .expect("Failed to materialize the invoices");
        assert_eq!(invoices.len(), 3);
        assert_eq!(invoices[0].total, None);
        assert_eq!(invoices[1].total, Some(Decimal::new(25, 1)));
        assert_eq!(invoices[2].customer, "Initech");

        // Row indexes restart with each result set
        let rows = vec![
            Ok(RowLabeled::new(first.clone(), [Value::Int64(Some(1)), Value::Null].into())),
            Ok(RowLabeled::new(
                Arc::clone(&second),
                [Value::Varchar(Some("Hooli".into()))].into(),
            )),
            Ok(RowLabeled::new(second, [Value::Blob(Some([0u8].into()))].into())),
        ];
        let error = materialize::<Invoice, _>(futures::stream::iter(rows), MappingOptions::default())
            .try_collect::<Vec<_>>()
            .await
            .expect_err("A blob is not a customer name");
        assert!(matches!(
            error.downcast_ref::<MappingError>(),
            Some(MappingError::MaterializationTypeMismatch { column, row: 1 })
                if column == "customer_name"
        ));
    }
}

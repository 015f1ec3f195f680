#![cfg(feature = "sqlite")]

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use sql_template_middleware::prelude::*;

const TEMPLATES: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SqlConfig>
  <data name="CreateOrders">
    <SqlDefinition type="sqlite">
      <SqlCommand>CREATE TABLE IF NOT EXISTS orders (id INTEGER PRIMARY KEY, status TEXT NOT NULL, total REAL NOT NULL)</SqlCommand>
    </SqlDefinition>
  </data>
  <data name="InsertOrder">
    <SqlDefinition type="sqlite">
      <SqlCommand>INSERT INTO orders (id, status, total) VALUES (@id, @status, @total)</SqlCommand>
    </SqlDefinition>
  </data>
  <data name="GetOrders">
    <SqlDefinition type="sqlite" Assembly="Shop.Models" ModelClassName="OrderLabel">
      <SqlCommand><![CDATA[
        SELECT id, status FROM orders WHERE 1=1 <%=AND status = @status%> <%=AND total >= @minTotal%> <R%=ORDER BY @sortCol%R>
      ]]></SqlCommand>
    </SqlDefinition>
  </data>
  <data name="CountOrders">
    <SqlDefinition type="sqlite"><![CDATA[SELECT COUNT(*) FROM orders WHERE 1=1 <%=AND status = @status%>]]></SqlDefinition>
  </data>
  <data name="CountByStatus">
    <SqlDefinition type="sqlite">SELECT COUNT(*) FROM orders WHERE 1=1 @@AND status = @status@@</SqlDefinition>
  </data>
  <data name="PageOrders">
    <SqlDefinition type="sqlite">
      <SqlCommand>
        SELECT id, status FROM orders ORDER BY id LIMIT @take OFFSET @skip;
        SELECT COUNT(*) FROM orders
      </SqlCommand>
    </SqlDefinition>
  </data>
</SqlConfig>"#;

#[derive(Debug, Deserialize, PartialEq)]
struct Order {
    id: i64,
    status: String,
}

fn setup(dir: &Path) -> Result<SqlHelper, Box<dyn std::error::Error>> {
    let templates = dir.join("SqlConfig");
    std::fs::create_dir_all(&templates)?;
    std::fs::write(templates.join("orders.xml"), TEMPLATES)?;

    let config = EngineConfig {
        install_dir: Some(dir.to_path_buf()),
        ..EngineConfig::default()
    };
    let cache = TemplateCache::open(&config.cache_options())?;
    let report = cache.reload()?;
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(cache.len(), 6);
    let conns = ConnectionStrings::new()
        .with("DbContext", dir.join("main.db").display().to_string())
        .with(
            "Tenant1_DbContext",
            format!("Data Source={};", dir.join("tenant1.db").display()),
        );
    Ok(SqlHelper::new(Arc::new(cache), Arc::new(conns)))
}

async fn seed(helper: &SqlHelper, params: &ParamMap) -> Result<(), SqlTemplateError> {
    helper.execute_non_query("CreateOrders", params, false).await?;
    let prefix = params.connection_prefix();
    let rows: Vec<ParamMap> = [(1, "SHIPPED", 10.0), (2, "OPEN", 25.5), (3, "SHIPPED", 40.0)]
        .into_iter()
        .map(|(id, status, total)| {
            let map = ParamMap::new()
                .with("id", id)
                .with("status", status)
                .with("total", total);
            match &prefix {
                Some(p) => map.with(CONNECTION_PREFIX, p.as_str()),
                None => map,
            }
        })
        .collect();
    let inserted = helper
        .execute_non_query_batch("InsertOrder", &rows, true)
        .await?;
    assert_eq!(inserted, 3);
    Ok(())
}

#[test]
fn optional_and_literal_directives_shape_the_query() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let dir = tempfile::tempdir()?;
    let helper = setup(dir.path())?;

    rt.block_on(async {
        seed(&helper, &ParamMap::new()).await?;

        let shipped: Vec<Order> = helper
            .query_as(
                "getorders",
                &ParamMap::new()
                    .with("status", "SHIPPED")
                    .with("sortCol", "id DESC"),
                false,
            )
            .await?;
        assert_eq!(
            shipped,
            vec![
                Order { id: 3, status: "SHIPPED".into() },
                Order { id: 1, status: "SHIPPED".into() },
            ]
        );

        // Blank status drops its fragment; minTotal still filters.
        let rows = helper
            .query_for_list(
                "GetOrders",
                &ParamMap::new()
                    .with("status", "  ")
                    .with("minTotal", 20.0)
                    .with("sortCol", "id"),
                false,
            )
            .await?;
        assert_eq!(
            rows,
            vec![
                serde_json::json!({"id": 2, "status": "OPEN"}),
                serde_json::json!({"id": 3, "status": "SHIPPED"}),
            ]
        );

        let first = helper
            .query_for_object("GetOrders", &ParamMap::new().with("sortCol", "total DESC"), false)
            .await?;
        assert_eq!(first, Some(serde_json::json!({"id": 3, "status": "SHIPPED"})));

        let count = helper
            .execute_scalar("CountOrders", &ParamMap::new().with("status", "OPEN"), false)
            .await?;
        assert_eq!(count, Some(RowValues::Int(1)));

        // A parameter directive is always kept, so a missing value binds NULL.
        let none = helper
            .execute_scalar("CountByStatus", &ParamMap::new(), false)
            .await?;
        assert_eq!(none, Some(RowValues::Int(0)));
        let shipped = helper
            .execute_scalar("CountByStatus", &ParamMap::new().with("status", "SHIPPED"), false)
            .await?;
        assert_eq!(shipped, Some(RowValues::Int(2)));
        Ok::<_, SqlTemplateError>(())
    })?;
    Ok(())
}

#[test]
fn paging_mapping_and_multiple_result_sets() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let dir = tempfile::tempdir()?;
    let helper = setup(dir.path())?;

    rt.block_on(async {
        seed(&helper, &ParamMap::new()).await?;

        let page: PagedResult<Order> = helper
            .query_page(
                "PageOrders",
                &ParamMap::new().with("take", 2).with("skip", 1),
                false,
            )
            .await?;
        assert_eq!(page.total, 3);
        assert_eq!(
            page.items.iter().map(|o| o.id).collect::<Vec<_>>(),
            vec![2, 3]
        );

        let sets = helper
            .query_multiple(
                "PageOrders",
                &ParamMap::new().with("take", 10).with("skip", 0),
                true,
            )
            .await?;
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].len(), 3);

        helper.mappers().register(
            ResultBinding::new("Shop.Models", "OrderLabel"),
            |row: &CustomDbRow| {
                let id = row.get("id").and_then(RowValues::as_int).copied().unwrap_or_default();
                let status = row.get("status").and_then(RowValues::as_text).unwrap_or_default();
                Ok(serde_json::json!(format!("{id}:{status}")))
            },
        );
        let labels = helper
            .query_bound("GetOrders", &ParamMap::new().with("sortCol", "id"), false)
            .await?;
        assert_eq!(
            labels,
            vec![
                serde_json::json!("1:SHIPPED"),
                serde_json::json!("2:OPEN"),
                serde_json::json!("3:SHIPPED"),
            ]
        );

        let ids = helper
            .query_mapped(
                "GetOrders",
                &ParamMap::new().with("status", "OPEN").with("sortCol", "id"),
                false,
                |row| {
                    row.get("id")
                        .and_then(RowValues::as_int)
                        .copied()
                        .ok_or_else(|| SqlTemplateError::ExecutionError("id missing".into()))
                },
            )
            .await?;
        assert_eq!(ids, vec![2]);
        Ok::<_, SqlTemplateError>(())
    })?;
    Ok(())
}

#[test]
fn connection_prefix_routes_to_tenant_database() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let dir = tempfile::tempdir()?;
    let helper = setup(dir.path())?;

    rt.block_on(async {
        let tenant = ParamMap::new().with(CONNECTION_PREFIX, "Tenant1_");
        seed(&helper, &tenant).await?;
        helper.execute_non_query("CreateOrders", &ParamMap::new(), false).await?;

        let tenant_count = helper.execute_scalar("CountOrders", &tenant, false).await?;
        let main_count = helper
            .execute_scalar("CountOrders", &ParamMap::new(), false)
            .await?;
        assert_eq!(tenant_count, Some(RowValues::Int(3)));
        assert_eq!(main_count, Some(RowValues::Int(0)));

        assert!(helper.test_connection("CountOrders", &tenant).await?);

        let missing = ParamMap::new().with(CONNECTION_PREFIX, "Tenant9_");
        let err = helper
            .execute_scalar("CountOrders", &missing, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SqlTemplateError::ConfigError(_)));
        Ok::<_, SqlTemplateError>(())
    })?;
    Ok(())
}

#[test]
fn batch_with_literal_directive_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let dir = tempfile::tempdir()?;
    let helper = setup(dir.path())?;

    let err = rt
        .block_on(helper.execute_non_query_batch(
            "GetOrders",
            &[ParamMap::new().with("sortCol", "id")],
            false,
        ))
        .unwrap_err();
    assert!(matches!(err, SqlTemplateError::Template(_)));
    Ok(())
}

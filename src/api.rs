use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use eyre::Result;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::fetcher::{query_history, AlchemyClient};
use crate::report::{to_csv, HistoryReport};

pub async fn serve(config: AppConfig, bind: &str) -> Result<()> {
    let client = Arc::new(AlchemyClient::new(config)?);

    let app = Router::new()
        .route("/", get(index))
        .route("/api/history", get(history))
        .route("/api/history.csv", get(history_csv))
        .with_state(client);

    let addr: SocketAddr = bind.parse()?;
    tracing::info!(%addr, "HTTP UI listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "Failed to listen for shutdown signal");
    }
}

#[derive(Deserialize)]
struct HistoryParams {
    address: String,
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn history(
    State(client): State<Arc<AlchemyClient>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryReport>, (StatusCode, String)> {
    let report = query_history(&client, &params.address)
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

async fn history_csv(
    State(client): State<Arc<AlchemyClient>>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let report = query_history(&client, &params.address)
        .await
        .map_err(error_response)?;
    let filename = format!("transfers-{}.csv", report.address);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        to_csv(&report.rows),
    ))
}

/// Bad input is the caller's fault; everything else that reaches this layer
/// is the provider or the wire.
fn error_response(err: AppError) -> (StatusCode, String) {
    let status = match err {
        AppError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
        AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AppError::ProviderResponse { .. } | AppError::Provider(_) | AppError::Transport(_) => {
            StatusCode::BAD_GATEWAY
        }
    };
    (status, err.to_string())
}

const INDEX_HTML: &str = r##"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Ethereum Transfer Explorer</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 72rem; padding: 0 1rem; color: #222; }
  h1 { font-size: 1.4rem; }
  input#address { width: 30rem; max-width: 90%; padding: .4rem; }
  button { padding: .4rem 1rem; }
  #status { color: #b00020; }
  .cards { display: flex; gap: 1rem; flex-wrap: wrap; margin: 1rem 0; }
  .card { border: 1px solid #ddd; border-radius: 6px; padding: .6rem 1rem; min-width: 9rem; }
  .card b { display: block; font-size: 1.2rem; }
  .charts { display: flex; gap: 2rem; flex-wrap: wrap; }
  .chart { flex: 1; min-width: 20rem; }
  .bar { display: flex; align-items: center; gap: .5rem; margin: .15rem 0; font-size: .8rem; }
  .bar span.fill { background: #4170d8; height: .9rem; display: inline-block; }
  .bar span.fill.out { background: #d85441; }
  #gallery { display: flex; gap: .8rem; flex-wrap: wrap; margin: 1rem 0; }
  #gallery figure { margin: 0; width: 9rem; font-size: .75rem; }
  #gallery img { width: 9rem; height: 9rem; object-fit: cover; border-radius: 6px; }
  table { border-collapse: collapse; width: 100%; font-size: .75rem; margin-top: 1rem; }
  th, td { border: 1px solid #ddd; padding: .25rem .4rem; text-align: left; max-width: 14rem; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }
</style>
</head>
<body>
<h1>Ethereum Transfer Explorer</h1>
<form id="q">
  <input id="address" placeholder="0x…" autocomplete="off">
  <button type="submit">Fetch</button>
  <a id="csv" hidden>Download CSV</a>
</form>
<p id="status" hidden></p>
<div id="summary" class="cards" hidden></div>
<div class="charts">
  <div id="flow" class="chart"></div>
  <div id="tokens" class="chart"></div>
</div>
<div id="gallery"></div>
<table id="table" hidden><thead></thead><tbody></tbody></table>
<script>
const COLUMNS = ["timestamp","category","from","to","hash","value_eth","token_symbol",
  "token_amount","token_decimals","token_id","is_nft","contract_address","nft_image"];
const $ = (id) => document.getElementById(id);

function reset(msg) {
  $("status").hidden = !msg;
  $("status").textContent = msg || "";
  $("summary").hidden = true;
  $("table").hidden = true;
  $("csv").hidden = true;
  $("flow").innerHTML = "";
  $("tokens").innerHTML = "";
  $("gallery").innerHTML = "";
}

function card(label, value) {
  return `<div class="card">${label}<b>${value}</b></div>`;
}

function bars(el, title, entries, width) {
  if (!entries.length) return;
  const max = Math.max(...entries.map((e) => e.size)) || 1;
  el.innerHTML = `<h3>${title}</h3>` + entries.map((e) =>
    `<div class="bar"><span class="fill${e.out ? " out" : ""}"
       style="width:${(e.size / max) * width}px"></span>${e.label}</div>`).join("");
}

$("q").addEventListener("submit", async (ev) => {
  ev.preventDefault();
  const address = $("address").value.trim();
  reset("Loading…");
  let resp;
  try {
    resp = await fetch(`/api/history?address=${encodeURIComponent(address)}`);
  } catch (err) {
    reset(`Request failed: ${err}`);
    return;
  }
  if (!resp.ok) {
    reset(`Error: ${await resp.text()}`);
    return;
  }
  const report = await resp.json();
  if (report.rows.length === 0) {
    reset("No transfers found for this address.");
    return;
  }
  reset();

  $("summary").hidden = false;
  $("summary").innerHTML =
    card("Transfers", report.transfer_count) +
    card("Total received (ETH)", report.eth_flow.total_in) +
    card("Total sent (ETH)", report.eth_flow.total_out) +
    card("Net (ETH)", report.eth_flow.net);

  bars($("flow"), "Daily ETH flow",
    report.daily_flow.flatMap((d) => [
      { label: `${d.date} in ${d.inflow}`, size: Number(d.inflow), out: false },
      { label: `${d.date} out ${d.outflow}`, size: Number(d.outflow), out: true },
    ]), 240);
  bars($("tokens"), "Token activity",
    report.token_activity.map((t) => (
      { label: `${t.symbol} (${t.transfers})`, size: t.transfers, out: false }
    )), 240);

  $("gallery").innerHTML = report.gallery.map((g) =>
    `<figure><img src="${g.image}" alt="NFT">
      <figcaption>${g.token_symbol ?? ""} ${g.token_id ?? ""}</figcaption></figure>`).join("");

  const table = $("table");
  table.hidden = false;
  table.tHead.innerHTML =
    "<tr>" + COLUMNS.map((c) => `<th>${c}</th>`).join("") + "</tr>";
  table.tBodies[0].innerHTML = report.rows.map((row) =>
    "<tr>" + COLUMNS.map((c) => `<td>${row[c] ?? ""}</td>`).join("") + "</tr>").join("");

  const csv = $("csv");
  csv.hidden = false;
  csv.href = `/api/history.csv?address=${encodeURIComponent(address)}`;
  csv.download = `transfers-${address}.csv`;
});
</script>
</body>
</html>
"##;

//! Inline dashboard page: metric cards, efficiency panel, two rolling charts,
//! and a datalog export button. Single HTML page with inline JS calling the
//! REST endpoints; no frontend toolchain required.

use axum::response::Html;

pub async fn dashboard() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Solar Array Monitor</title>
  <style>
    :root {
      color-scheme: dark;
      --bg: #1c1c1c;
      --card: #262626;
      --border: #3a3a3a;
      --text: #f3f4f6;
      --muted: #9ca3af;
      --orange: #FF9900;
      --blue: #007FFF;
      --alert: #ef4444;
    }
    * { box-sizing: border-box; }
    body { font-family: "Inter", system-ui, -apple-system, sans-serif; margin: 0; background: var(--bg); color: var(--text); }
    header { padding: 1.25rem 2rem; border-bottom: 1px solid var(--border); display: flex; align-items: center; justify-content: space-between; }
    h1 { margin: 0; font-size: 1.4rem; }
    .sub { color: var(--muted); margin: 0.25rem 0 0; font-size: 0.9rem; }
    .status-ok { color: #22c55e; font-weight: 700; }
    main { padding: 1.5rem 2rem; max-width: 1300px; margin: 0 auto; display: flex; flex-direction: column; gap: 1rem; }
    .card-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(190px, 1fr)); gap: 0.75rem; }
    .card { background: var(--card); border: 1px solid var(--border); border-radius: 12px; padding: 0.85rem 1rem; }
    .card .label { color: var(--muted); font-size: 0.8rem; text-transform: uppercase; letter-spacing: 0.04em; }
    .card .value { font-size: 1.5rem; font-weight: 700; margin-top: 0.25rem; }
    .card .unit { font-size: 0.9rem; color: var(--muted); margin-left: 0.25rem; }
    .primary .value { color: var(--orange); }
    .secondary .value { color: var(--blue); }
    .section-title { margin: 0.5rem 0 0; font-size: 1rem; color: var(--orange); }
    .charts { display: grid; grid-template-columns: 1fr 1fr; gap: 1rem; }
    canvas { width: 100%; height: 220px; background: var(--card); border: 1px solid var(--border); border-radius: 12px; }
    button { padding: 0.55rem 0.9rem; border: none; border-radius: 8px; background: var(--orange); color: #111; cursor: pointer; font-weight: 700; }
    #banner { color: var(--muted); }
    #banner.alert { color: var(--alert); }
  </style>
</head>
<body>
  <header>
    <div>
      <h1>Solar Array Monitor</h1>
      <p class="sub">System Status: <span class="status-ok" id="status">WAITING FOR DATA</span></p>
    </div>
    <button onclick="downloadDatalog()" title="Download all current data">DATALOG EXPORT</button>
  </header>
  <main>
    <p id="banner">No data yet. POST a reading to /data or start the panel agent.</p>
    <h2 class="section-title">Primary Core Metrics</h2>
    <div class="card-grid">
      <div class="card primary"><div class="label">Efficiency</div><div class="value"><span id="efficiency">-</span><span class="unit">%</span></div></div>
      <div class="card primary"><div class="label">Power (Instant)</div><div class="value"><span id="power">-</span><span class="unit">kW</span></div></div>
      <div class="card primary"><div class="label">Energy Total</div><div class="value"><span id="energyTotal">-</span><span class="unit">kWh</span></div></div>
      <div class="card secondary"><div class="label">Voltage</div><div class="value"><span id="voltage">-</span><span class="unit">V</span></div></div>
      <div class="card secondary"><div class="label">Current</div><div class="value"><span id="current">-</span><span class="unit">A</span></div></div>
    </div>
    <h2 class="section-title">Telemetry &amp; Environmental Details</h2>
    <div class="card-grid">
      <div class="card secondary"><div class="label">Light Intensity</div><div class="value"><span id="lightIntensity">-</span><span class="unit">Lux</span></div></div>
      <div class="card secondary"><div class="label">Panel Temp</div><div class="value"><span id="panelTemp">-</span><span class="unit">&deg;C</span></div></div>
      <div class="card secondary"><div class="label">Dust Level</div><div class="value"><span id="dustLevel">-</span><span class="unit">%</span></div></div>
      <div class="card secondary"><div class="label">Inclination Angle</div><div class="value"><span id="inclinationAngle">-</span><span class="unit">&deg;</span></div></div>
      <div class="card secondary"><div class="label">Panel Direction</div><div class="value"><span id="panelDirection">-</span></div></div>
      <div class="card primary"><div class="label">Sensor Health</div><div class="value"><span id="sensorHealth">-</span></div></div>
    </div>
    <div class="charts">
      <canvas id="powerChart" width="600" height="220"></canvas>
      <canvas id="efficiencyChart" width="600" height="220"></canvas>
    </div>
  </main>

<script>
const MAX_HISTORY = 30;
const POLL_MS = 5000;
let lastReading = null;
let performanceHistory = [];
let correlationHistory = [];

async function poll() {
  try {
    const res = await fetch('/data');
    if (res.status === 404) {
      setBanner('No data yet. POST a reading to /data or start the panel agent.', false);
      return;
    }
    if (!res.ok) throw new Error(`HTTP ${res.status}`);
    const body = await res.json();
    lastReading = body.data;
    const now = new Date().toLocaleTimeString();
    performanceHistory.push({ time: now, power: lastReading.power, lightIntensity: lastReading.lightIntensity });
    if (performanceHistory.length > MAX_HISTORY) performanceHistory.shift();
    correlationHistory.push({ time: now, efficiency: lastReading.efficiency, panelTemp: lastReading.panelTemp });
    if (correlationHistory.length > MAX_HISTORY) correlationHistory.shift();
    render();
  } catch (err) {
    // Keep the last good reading on screen; next tick is the retry.
    setBanner('Fetch failed: ' + err + ' (showing last good reading)', true);
  }
}

function setBanner(text, alert) {
  const banner = document.getElementById('banner');
  banner.textContent = text;
  banner.className = alert ? 'alert' : '';
  banner.style.display = '';
}

function setValue(id, value, digits) {
  const el = document.getElementById(id);
  el.textContent = typeof value === 'number' ? value.toFixed(digits) : value;
}

function render() {
  if (!lastReading) return;
  document.getElementById('banner').style.display = 'none';
  document.getElementById('status').textContent = 'GENERATING POWER';
  setValue('efficiency', lastReading.efficiency, 1);
  setValue('power', lastReading.power, 2);
  setValue('energyTotal', lastReading.energyTotal, 2);
  setValue('voltage', lastReading.voltage, 1);
  setValue('current', lastReading.current, 1);
  setValue('lightIntensity', lastReading.lightIntensity, 0);
  setValue('panelTemp', lastReading.panelTemp, 1);
  setValue('dustLevel', lastReading.dustLevel, 1);
  setValue('inclinationAngle', lastReading.inclinationAngle, 0);
  setValue('panelDirection', lastReading.panelDirection);
  setValue('sensorHealth', lastReading.sensorHealth);
  drawSeries('powerChart', performanceHistory.map(p => p.power), 'Power (kW)', '#FF9900');
  drawSeries('efficiencyChart', correlationHistory.map(p => p.efficiency), 'Efficiency (%)', '#007FFF');
}

function drawSeries(canvasId, values, label, color) {
  const canvas = document.getElementById(canvasId);
  const ctx = canvas.getContext('2d');
  const w = canvas.width, h = canvas.height, pad = 28;
  ctx.clearRect(0, 0, w, h);
  ctx.fillStyle = '#9ca3af';
  ctx.font = '12px sans-serif';
  ctx.fillText(label, pad, 16);
  if (values.length < 2) return;
  const min = Math.min(...values), max = Math.max(...values);
  const span = (max - min) || 1;
  ctx.strokeStyle = color;
  ctx.lineWidth = 2;
  ctx.beginPath();
  values.forEach((v, i) => {
    const x = pad + (w - 2 * pad) * i / (values.length - 1);
    const y = h - pad - (h - 2 * pad) * (v - min) / span;
    i === 0 ? ctx.moveTo(x, y) : ctx.lineTo(x, y);
  });
  ctx.stroke();
  ctx.fillText(max.toFixed(1), 2, pad);
  ctx.fillText(min.toFixed(1), 2, h - pad);
}

function downloadDatalog() {
  if (!lastReading) { alert('No data to export yet.'); return; }
  const payload = {
    timestamp: new Date().toISOString(),
    current_metrics: {
      voltage: `${lastReading.voltage.toFixed(1)} V`,
      current: `${lastReading.current.toFixed(1)} A`,
      power: `${lastReading.power.toFixed(2)} kW`,
      energy: `${lastReading.energyTotal.toFixed(2)} kWh`,
      efficiency: `${lastReading.efficiency.toFixed(1)} %`,
    },
    physical_and_environmental_data: {
      angle: `${lastReading.inclinationAngle} degrees`,
      panelDirection: lastReading.panelDirection,
      lightIntensity: `${lastReading.lightIntensity.toFixed(0)} Lux`,
      panelTemp: `${lastReading.panelTemp.toFixed(1)} °C`,
      dustLevel: `${lastReading.dustLevel.toFixed(1)} %`,
    },
    performance_history: performanceHistory,
    correlation_history: correlationHistory,
  };
  const blob = new Blob([JSON.stringify(payload, null, 2)], { type: 'application/json' });
  const url = URL.createObjectURL(blob);
  const a = document.createElement('a');
  a.href = url;
  a.download = 'solar_datalog.json';
  document.body.appendChild(a);
  a.click();
  document.body.removeChild(a);
  URL.revokeObjectURL(url);
}

poll();
setInterval(poll, POLL_MS);
</script>
</body>
</html>
"#,
    )
}

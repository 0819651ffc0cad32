/// Viewer page served at `/`: both streams refreshed by polling, plus a
/// status line from `/status`.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Pi-Kinect Stream</title>
  <style>
    body { font-family: sans-serif; text-align: center; background: #f0f0f0; margin: 0; padding: 20px; }
    .container { max-width: 1200px; margin: 0 auto; background: #fff; padding: 20px; border-radius: 8px; }
    .streams { display: flex; gap: 20px; justify-content: center; flex-wrap: wrap; }
    .streams img { max-width: 100%; height: auto; border: 2px solid #ddd; border-radius: 4px; }
    #status { margin: 10px 0; color: #666; }
    button { background: #007bff; color: #fff; border: none; padding: 8px 16px; margin: 4px; border-radius: 4px; cursor: pointer; }
  </style>
</head>
<body>
  <div class="container">
    <h1>Pi-Kinect Camera Stream</h1>
    <div id="status">Connecting...</div>
    <div class="streams">
      <div><h3>RGB Camera</h3><img id="video" src="/stream" alt="RGB feed"></div>
      <div><h3>Depth Camera</h3><img id="depth" src="/depth" alt="Depth feed"></div>
    </div>
    <div>
      <button onclick="togglePause()" id="pause">Pause</button>
      <button onclick="checkStatus()">Check Status</button>
      <button onclick="captureFrame()">Capture Frame</button>
    </div>
  </div>
  <script>
    const video = document.getElementById('video');
    const depth = document.getElementById('depth');
    const statusLine = document.getElementById('status');
    let paused = false;

    function setStatus(text, isError) {
      statusLine.textContent = text;
      statusLine.style.color = isError ? '#dc3545' : '#28a745';
    }

    function refresh() {
      if (paused) return;
      const t = Date.now();
      video.src = '/stream?' + t;
      depth.src = '/depth?' + t;
    }

    function togglePause() {
      paused = !paused;
      document.getElementById('pause').textContent = paused ? 'Resume' : 'Pause';
    }

    function checkStatus() {
      fetch('/status')
        .then(r => r.json())
        .then(d => {
          const camera = d.kinect_available ? d.kinect_method : 'Not Available';
          setStatus(`Running: ${d.running}, Frames: ${d.frame_count}, FPS: ${d.fps.toFixed(1)}, Camera: ${camera}`, !d.kinect_available);
        })
        .catch(e => setStatus('Status check failed: ' + e, true));
    }

    function captureFrame() {
      const link = document.createElement('a');
      link.download = 'kinect_frame_' + Date.now() + '.jpg';
      link.href = video.src;
      link.click();
    }

    video.onerror = () => setStatus('Stream connection failed', true);
    setInterval(refresh, 200);
    setInterval(checkStatus, 5000);
    checkStatus();
  </script>
</body>
</html>
"#;

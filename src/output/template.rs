//! HTML Template
//!
//! レポートHTMLの固定部分（スタイルシート）を保持します。

/// インラインCSS
pub(crate) const STYLESHEET: &str = r#"body {
  font-family: "Hiragino Sans", "Segoe UI", sans-serif;
  background: linear-gradient(180deg, #f0f4f8, #ffffff);
  color: #222;
  line-height: 1.7;
  margin: 40px auto;
  max-width: 900px;
  padding: 0 20px;
}
.card {
  background: #fff;
  border-radius: 16px;
  padding: 24px;
  margin-bottom: 32px;
  box-shadow: 0 4px 12px rgba(0,0,0,0.08);
  transition: transform 0.2s ease;
}
.card:hover {
  transform: translateY(-2px);
}
h1 {
  color: #0056b3;
  font-size: 1.8rem;
  margin-bottom: 0.5rem;
}
h2 {
  border-bottom: 3px solid #0078d7;
  padding-bottom: 6px;
  color: #005fa3;
  font-size: 1.3rem;
  margin-top: 1.5rem;
}
.date {
  font-weight: bold;
  color: #0078d7;
  margin-top: 16px;
  font-size: 1.1rem;
}
.time {
  font-weight: bold;
  color: #333;
  margin-top: 8px;
  font-size: 1rem;
}
.event {
  background: #f5f9ff;
  border-left: 5px solid #0078d7;
  border-radius: 8px;
  padding: 12px 16px;
  margin: 10px 0;
}
.images {
  display: flex;
  flex-wrap: wrap;
  gap: 12px;
  margin-top: 10px;
}
.images img {
  max-width: 200px;
  border-radius: 8px;
  box-shadow: 0 2px 6px rgba(0,0,0,0.15);
  transition: transform 0.2s ease;
}
.images img:hover {
  transform: scale(1.03);
}
.summary-item {
  margin: 6px 0;
}
"#;

lumiplug::serve_provider!(aws::provider()?);

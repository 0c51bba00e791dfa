use std::sync::Arc;
use std::time::Instant;
use log::{debug, trace, warn};
use reqwest::StatusCode;
use crate::config::ClientConfig;
use crate::error::{Error, ErrorKind};
use crate::events::{Event, EventSink, LogSink};
use crate::request::{
  GenerateRequest, GenerateResponse, ModelTag, Outcome, TagsResponse
};
use crate::retry::{classify_status, classify_transport, RetryPolicy, Verdict};
use crate::validate::{validate_params, validate_prompt};

/// Client for an Ollama-style inference endpoint.
///
/// Holds no per-call state: every `generate` call validates, probes,
/// retries and classifies on its own and hands back one `Outcome`.
pub struct InferenceClient
{   config: ClientConfig
  , policy: RetryPolicy
  , http_client: reqwest::Client
  , sink: Arc<dyn EventSink>
}

impl InferenceClient
{   /// Create a client; events go to the `log` facade
    pub fn new(config: ClientConfig) -> Result<Self, Error>
    {   debug!("Creating InferenceClient for {}", config.base_url);
        config.validate()?;
        let http_client = reqwest::Client::builder().build()?;
        Ok(InferenceClient
        {   policy: RetryPolicy::from(&config.retry)
          , config
          , http_client
          , sink: Arc::new(LogSink)
        })
    }

    /// Send events to `sink` instead of the log
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self
    {   self.sink = sink;
        self
    }

    pub fn config(&self) -> &ClientConfig
    {   &self.config
    }

    /// Generate a completion for `prompt`.
    ///
    /// Never fails: every error is classified into the returned Outcome.
    pub async fn generate(
      &self
    , prompt: &str
    , model: &str
    , temperature: f32
    ) -> Outcome
    {   let started = Instant::now();
        debug!("generate called for model: {}", model);

        if let Err(outcome) = validate_prompt(prompt)
          .and_then(|_| validate_params(model, temperature))
        {   return self.finish(model, temperature, outcome, 0, started);
        }

        if let Err(outcome) = self.probe().await
        {   if let Outcome::Failure { error_kind, error_message }
              = &outcome
            {   self.sink.record(&Event::ProbeFailed
                {   kind: *error_kind
                  , message: error_message.clone()
                  , elapsed: started.elapsed()
                });
            }
            return self.finish(model, temperature, outcome, 0, started);
        }

        let request = GenerateRequest::new(prompt, model, temperature);
        trace!("Generate request: {:?}", request);

        for attempt in 0..self.policy.max_attempts
        {   self.sink.record(&Event::Attempt
            {   model: model.to_string()
              , temperature
              , prompt_len: prompt.chars().count()
              , attempt: attempt + 1
            });

            match self.attempt(&request, attempt).await
            {   Verdict::Done(outcome) => {
                  return self.finish(
                    model, temperature, outcome, attempt + 1, started
                  );
                }
              , Verdict::Retry { kind, message, delay } => {
                  warn!(
                    "Attempt {}/{} failed ({}): {}"
                  , attempt + 1, self.policy.max_attempts, kind, message
                  );
                  if !delay.is_zero()
                  {   self.sink.record(&Event::Backoff
                      {   kind
                        , attempt: attempt + 1
                        , delay
                      });
                      tokio::time::sleep(delay).await;
                  }
                  if self.policy.is_last(attempt)
                  {   return self.finish(
                        model
                      , temperature
                      , Outcome::failure(kind, message)
                      , attempt + 1
                      , started
                      );
                  }
                }
            }
        }

        let attempts = self.policy.max_attempts;
        self.finish(
          model
        , temperature
        , Outcome::failure(
            ErrorKind::MaxRetriesExceeded
          , format!("Gave up after {} attempts", attempts)
          )
        , attempts
        , started
        )
    }

    /// Models installed on the endpoint
    pub async fn list_models(&self) -> Result<Vec<ModelTag>, Error>
    {   debug!("Handling list_models");
        let response = self.http_client
          .get(format!("{}/api/tags", self.config.base()))
          .timeout(self.config.probe_timeout())
          .send()
          .await?;

        let status = response.status();
        trace!("Tags response status: {}", status);
        if !status.is_success()
        {   return Err(Error::ApiError(
              format!("Ollama server error: {}", status.as_u16())
            ));
        }

        let body = response.text().await?;
        let tags: TagsResponse = serde_json::from_str(&body)?;
        debug!("Retrieved {} models", tags.models.len());
        Ok(tags.models)
    }

    /// Cheap reachability check; failures are never retried
    async fn probe(&self) -> Result<(), Outcome>
    {   let base = self.config.base();
        let result = self.http_client
          .get(format!("{}/api/tags", base))
          .timeout(self.config.probe_timeout())
          .send()
          .await;

        match result
        {   Ok(response) if response.status().is_success() => {
              trace!("Probe ok: {}", response.status());
              Ok(())
            }
          , Ok(response) => Err(Outcome::failure(
              ErrorKind::ConnectionError
            , format!(
                "Ollama server error: {}"
              , response.status().as_u16()
              )
            ))
          , Err(e) if e.is_timeout() => Err(Outcome::failure(
              ErrorKind::TimeoutError
            , format!("Ollama server at {} did not answer in time", base)
            ))
          , Err(e) => Err(Outcome::failure(
              ErrorKind::ConnectionError
            , format!("Cannot connect to Ollama server at {}: {}", base, e)
            ))
        }
    }

    /// One POST, classified
    async fn attempt(
      &self
    , request: &GenerateRequest
    , attempt: usize
    ) -> Verdict
    {   let response = match self.http_client
          .post(format!("{}/api/generate", self.config.base()))
          .timeout(self.config.request_timeout())
          .json(request)
          .send()
          .await
        {   Ok(response) => response
          , Err(e) => return classify_transport(&self.policy, &e)
        };

        let status = response.status();
        trace!("Generate response status: {}", status);
        if status != StatusCode::OK
        {   return classify_status(
              &self.policy, attempt, status, &request.model
            );
        }

        let body = match response.text().await
        {   Ok(body) => body
          , Err(e) => return classify_transport(&self.policy, &e)
        };

        match serde_json::from_str::<GenerateResponse>(&body)
        {   Ok(parsed) => Verdict::Done(Outcome::success(
              parsed.response.unwrap_or_default()
            ))
          , Err(e) => Verdict::Done(Outcome::failure(
              ErrorKind::JsonError
            , format!("Invalid JSON response: {}", e)
            ))
        }
    }

    fn finish(
      &self
    , model: &str
    , temperature: f32
    , outcome: Outcome
    , attempts: usize
    , started: Instant
    ) -> Outcome
    {   let elapsed = started.elapsed();
        match &outcome
        {   Outcome::Success { response_text } => {
              self.sink.record(&Event::Success
              {   model: model.to_string()
                , temperature
                , response_len: response_text.chars().count()
                , attempts
                , elapsed
              });
            }
          , Outcome::Failure { error_kind, error_message } => {
              self.sink.record(&Event::Failure
              {   model: model.to_string()
                , kind: *error_kind
                , message: error_message.clone()
                , attempts
                , elapsed
              });
            }
        }
        outcome
    }
}
